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

//! etcd as the directory behind `srad`.
//!
//! Besides the [`EtcdConnector`], this crate offers the process-wide
//! shortcuts [`register`] and [`discover`]. Both read the registry section of
//! the global config; `discover` shares one [`Discovery`] per process.

mod client;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use srad::{Channel, ConnectOptions, ConsumerOptions, Discovery, Error, RegisterOptions, Registration};
use srad_base::constants::DEFAULT_REGISTRY_PROTOCOL;
use srad_config::{get_global_config, RegistryConfig};
use srad_logger::tracing::info;

pub use client::{EtcdClient, EtcdConnector};

static DISCOVERY: OnceCell<Discovery> = OnceCell::new();

fn check_protocol(config: &RegistryConfig) -> Result<(), Error> {
    if config.protocol != DEFAULT_REGISTRY_PROTOCOL {
        return Err(Error::InvalidArgument(format!(
            "registry protocol {:?} is not served by etcd",
            config.protocol
        )));
    }
    Ok(())
}

fn endpoints_or_configured(endpoints: &[String]) -> Result<Vec<String>, Error> {
    if !endpoints.is_empty() {
        return Ok(endpoints.to_vec());
    }
    Ok(get_global_config()?.registry.endpoints.clone())
}

/// Publishes `host:port` for the service with the default ttl.
pub async fn register(
    scheme: &str,
    service: &str,
    host: &str,
    port: u16,
    weight: i64,
    endpoints: &[String],
) -> Result<Registration, Error> {
    let config = get_global_config()?;
    check_protocol(&config.registry)?;
    let options = RegisterOptions::new(scheme, service, host, port)
        .with_weight(weight)
        .with_connect_options(ConnectOptions::from(&config.registry));
    let endpoints = endpoints_or_configured(endpoints)?;
    srad::register(&EtcdConnector, options, &endpoints).await
}

/// Returns a channel to the service from the process-wide discovery.
pub async fn discover(
    scheme: &str,
    service: &str,
    endpoints: &[String],
) -> Result<Arc<Channel>, Error> {
    let discovery = DISCOVERY.get_or_try_init(|| {
        let config = get_global_config()?;
        check_protocol(&config.registry)?;
        let options = ConsumerOptions::from(config);
        info!("start discovery, {:?}", options);
        Discovery::new(Arc::new(EtcdConnector), options)
    })?;
    let endpoints = endpoints_or_configured(endpoints)?;
    discovery.discover(scheme, service, &endpoints).await
}
