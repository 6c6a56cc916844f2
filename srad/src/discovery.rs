/*
 * Licensed to the Apache Software Foundation (ASF) under one or more
 * contributor license agreements.  See the NOTICE file distributed with
 * this work for additional information regarding copyright ownership.
 * The ASF licenses this file to You under the Apache License, Version 2.0
 * (the "License"); you may not use this file except in compliance with
 * the License.  You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use srad_base::{
    constants::{DEFAULT_POOL_SIZE, SMOOTH_WEIGHTED_ROUND_ROBIN},
    ServiceKey,
};
use srad_config::RootConfig;
use srad_logger::tracing::{debug, info};
use tokio::sync::Mutex;

use crate::{
    channel::Channel,
    directory::{BoxDirectoryConnector, ConnectOptions},
    error::Error,
    loadbalance::{get_picker_builder, types::BoxPickerBuilder},
    pool::{ConnectionFactory, ConnectionPool},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub pool_size: usize,
    pub load_balance: String,
    pub connect: ConnectOptions,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        ConsumerOptions {
            pool_size: DEFAULT_POOL_SIZE,
            load_balance: SMOOTH_WEIGHTED_ROUND_ROBIN.to_string(),
            connect: ConnectOptions::default(),
        }
    }
}

impl From<&RootConfig> for ConsumerOptions {
    fn from(config: &RootConfig) -> Self {
        ConsumerOptions {
            pool_size: config.consumer.pool_size,
            load_balance: config.consumer.load_balance.clone(),
            connect: ConnectOptions::from(&config.registry),
        }
    }
}

/// One connection pool per service, built on first discovery.
pub struct Discovery {
    connector: BoxDirectoryConnector,
    options: ConsumerOptions,
    builder: &'static BoxPickerBuilder,
    pools: DashMap<ServiceKey, Arc<ConnectionPool<Channel>>>,
    build_lock: Mutex<()>,
}

impl Discovery {
    pub fn new(connector: BoxDirectoryConnector, options: ConsumerOptions) -> Result<Self, Error> {
        if options.pool_size == 0 {
            return Err(Error::InvalidArgument("pool size must be positive".to_string()));
        }
        let builder = get_picker_builder(&options.load_balance)?;
        Ok(Discovery {
            connector,
            options,
            builder,
            pools: DashMap::new(),
            build_lock: Mutex::new(()),
        })
    }

    /// Returns a channel to the service, building its pool on first use.
    pub async fn discover(
        &self,
        scheme: &str,
        service: &str,
        endpoints: &[String],
    ) -> Result<Arc<Channel>, Error> {
        let key = ServiceKey::new(scheme, service);
        let cached = self.pools.get(&key).map(|pool| pool.value().clone());
        let pool = match cached {
            Some(pool) => pool,
            None => self.build_pool(key, endpoints).await?,
        };
        pool.get().await
    }

    async fn build_pool(
        &self,
        key: ServiceKey,
        endpoints: &[String],
    ) -> Result<Arc<ConnectionPool<Channel>>, Error> {
        let _guard = self.build_lock.lock().await;
        let cached = self.pools.get(&key).map(|pool| pool.value().clone());
        if let Some(pool) = cached {
            return Ok(pool);
        }

        let factory = self.channel_factory(key.clone(), endpoints.to_vec());
        let pool = Arc::new(ConnectionPool::new(self.options.pool_size, factory)?);
        self.pools.insert(key.clone(), pool.clone());
        info!("discovering {} with {} channels", key, self.options.pool_size);
        Ok(pool)
    }

    fn channel_factory(&self, target: ServiceKey, endpoints: Vec<String>) -> ConnectionFactory<Channel> {
        let connector = self.connector.clone();
        let builder = self.builder;
        let options = self.options.connect.clone();
        let endpoints = Arc::new(endpoints);
        Arc::new(move || -> BoxFuture<'static, Result<Channel, Error>> {
            let connector = connector.clone();
            let endpoints = endpoints.clone();
            let target = target.clone();
            let options = options.clone();
            Box::pin(async move {
                Channel::connect(target, connector.as_ref(), &endpoints, builder, &options).await
            })
        })
    }

    /// Closes and forgets the pool of one service.
    pub fn remove(&self, scheme: &str, service: &str) -> bool {
        match self.pools.remove(&ServiceKey::new(scheme, service)) {
            Some((key, pool)) => {
                pool.close();
                debug!("removed pool of {}", key);
                true
            }
            None => false,
        }
    }

    pub fn close(&self) {
        self.pools.retain(|_, pool| {
            pool.close();
            false
        });
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl Debug for Discovery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("options", &self.options)
            .field("pools", &self.pools.len())
            .finish()
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.close();
    }
}
