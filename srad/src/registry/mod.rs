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

//! Publishing a service instance into the directory.
//!
//! A [`Registration`] owns one lease. The entry lives as long as the lease is
//! kept alive; unregistering revokes the lease and the directory drops the
//! entry with it.

use srad_base::{
    constants::{DEFAULT_TTL, DEFAULT_WEIGHT, MAX_WEIGHT},
    join_host_port, ServiceKey,
};
use srad_config::ProviderConfig;
use srad_logger::tracing::{debug, info, trace, warn};
use srad_utils::host_util::local_host;
use tokio::task::JoinHandle;

use crate::{
    directory::{
        BoxDirectoryClient, ConnectOptions, DirectoryClient, DirectoryConnector, KeepAliveStream,
        LeaseId,
    },
    error::Error,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOptions {
    pub scheme: String,
    pub service: String,
    /// Empty means the local ip address.
    pub host: String,
    pub port: u16,
    pub weight: i64,
    /// Lease ttl in seconds.
    pub ttl: i64,
    pub connect: ConnectOptions,
}

impl RegisterOptions {
    pub fn new(
        scheme: impl Into<String>,
        service: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        RegisterOptions {
            scheme: scheme.into(),
            service: service.into(),
            host: host.into(),
            port,
            weight: DEFAULT_WEIGHT,
            ttl: DEFAULT_TTL,
            connect: ConnectOptions::default(),
        }
    }

    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_connect_options(mut self, connect: ConnectOptions) -> Self {
        self.connect = connect;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.scheme.is_empty() || self.scheme.contains(['/', ':']) {
            return Err(Error::InvalidArgument(format!("invalid scheme {:?}", self.scheme)));
        }
        if self.service.is_empty() || self.service.contains('/') {
            return Err(Error::InvalidArgument(format!("invalid service {:?}", self.service)));
        }
        if self.weight <= 0 || self.weight > MAX_WEIGHT {
            return Err(Error::MalformedWeight {
                addr: join_host_port(&self.host, self.port),
                weight: self.weight.to_string(),
            });
        }
        if self.ttl <= 0 {
            return Err(Error::InvalidArgument(format!("ttl must be positive, got {}", self.ttl)));
        }
        Ok(())
    }
}

impl From<&ProviderConfig> for RegisterOptions {
    fn from(config: &ProviderConfig) -> Self {
        RegisterOptions::new(&config.scheme, &config.service, &config.host, config.port)
            .with_weight(config.weight)
            .with_ttl(config.ttl)
    }
}

/// A published entry. Dropping it stops the keepalive, so the entry expires
/// once the lease ttl elapses; [`Registration::unregister`] removes it at once.
#[derive(Debug)]
pub struct Registration {
    client: BoxDirectoryClient,
    lease_id: LeaseId,
    key: String,
    address: String,
    keep_alive: JoinHandle<()>,
}

impl Registration {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn lease_id(&self) -> LeaseId {
        self.lease_id
    }

    pub async fn unregister(self) -> Result<(), Error> {
        self.keep_alive.abort();
        let revoked = self.client.revoke(self.lease_id).await;
        self.client.close();
        revoked.map_err(Error::directory)?;
        info!("unregistered {}", self.key);
        Ok(())
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.keep_alive.abort();
    }
}

pub async fn register<C>(
    connector: &C,
    options: RegisterOptions,
    endpoints: &[String],
) -> Result<Registration, Error>
where
    C: DirectoryConnector + Sync + ?Sized,
{
    options.validate()?;

    let host = if options.host.trim().is_empty() {
        local_host()
    } else {
        options.host.clone()
    };
    let address = join_host_port(&host, options.port);
    let key = ServiceKey::new(&options.scheme, &options.service).entry_key(&address, options.weight);

    let client = connector
        .connect(endpoints, &options.connect)
        .await
        .map_err(Error::directory)?;

    let (lease_id, mut acks) = match publish(&client, &key, &address, options.ttl).await {
        Ok(published) => published,
        Err(err) => {
            client.close();
            return Err(err);
        }
    };

    let keep_alive = tokio::spawn(async move {
        while let Some(ack) = acks.recv().await {
            trace!("lease {} refreshed, ttl {}s", ack.lease, ack.ttl);
        }
        debug!("keepalive for lease {} closed", lease_id);
    });

    info!("registered {} with lease {}", key, lease_id);
    Ok(Registration {
        client,
        lease_id,
        key,
        address,
        keep_alive,
    })
}

async fn publish(
    client: &BoxDirectoryClient,
    key: &str,
    address: &str,
    ttl: i64,
) -> Result<(LeaseId, KeepAliveStream), Error> {
    let lease_id = client.grant(ttl).await.map_err(Error::directory)?;
    let published = match client.put(key, address, lease_id).await {
        Ok(()) => client.keep_alive(lease_id).await,
        Err(err) => Err(err),
    };
    match published {
        Ok(acks) => Ok((lease_id, acks)),
        Err(err) => {
            // the entry must not outlive a failed registration
            if let Err(revoke_err) = client.revoke(lease_id).await {
                warn!("revoke lease {} after failed register: {}", lease_id, revoke_err);
            }
            Err(Error::directory(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::memory::MemoryDirectory;

    #[tokio::test]
    async fn test_register_and_unregister() {
        let directory = MemoryDirectory::new();
        let options = RegisterOptions::new("mm", "auth", "127.0.0.1", 10001).with_weight(3);
        let registration = register(&directory, options, &[]).await.unwrap();

        assert_eq!(registration.key(), "mm:///auth/127.0.0.1:10001?weight=3");
        assert_eq!(registration.address(), "127.0.0.1:10001");
        let kv = directory.get(registration.key()).unwrap();
        assert_eq!(kv.value, "127.0.0.1:10001");
        assert_eq!(kv.lease, registration.lease_id());

        registration.unregister().await.unwrap();
        assert!(directory.keys().is_empty());
        assert_eq!(directory.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_host_uses_local_host() {
        let directory = MemoryDirectory::new();
        let registration = register(&directory, RegisterOptions::new("mm", "auth", "", 80), &[])
            .await
            .unwrap();
        assert_eq!(registration.address(), join_host_port(&local_host(), 80));
    }

    #[tokio::test]
    async fn test_invalid_options() {
        let directory = MemoryDirectory::new();

        let weight = RegisterOptions::new("mm", "auth", "127.0.0.1", 80).with_weight(0);
        let err = register(&directory, weight, &[]).await.unwrap_err();
        assert!(matches!(err, Error::MalformedWeight { .. }));

        let ttl = RegisterOptions::new("mm", "auth", "127.0.0.1", 80).with_ttl(0);
        let err = register(&directory, ttl, &[]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let service = RegisterOptions::new("mm", "", "127.0.0.1", 80);
        let err = register(&directory, service, &[]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        assert_eq!(directory.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_weight_above_max() {
        let directory = MemoryDirectory::new();
        let options = RegisterOptions::new("mm", "auth", "127.0.0.1", 80).with_weight(MAX_WEIGHT + 1);
        let err = register(&directory, options, &[]).await.unwrap_err();
        assert!(matches!(err, Error::MalformedWeight { .. }));
    }

    #[tokio::test]
    async fn test_failed_keep_alive_revokes_lease() {
        let directory = MemoryDirectory::new();
        directory.set_keep_alive_refused(true);
        let options = RegisterOptions::new("mm", "auth", "127.0.0.1", 80);
        let err = register(&directory, options, &[]).await.unwrap_err();

        assert!(matches!(err, Error::DirectoryUnavailable(_)));
        assert!(directory.keys().is_empty());
        assert_eq!(directory.lease_count(), 0);
    }

    #[tokio::test]
    async fn test_directory_unavailable() {
        let directory = MemoryDirectory::new();
        directory.set_unavailable(true);
        let options = RegisterOptions::new("mm", "auth", "127.0.0.1", 80);
        let err = register(&directory, options, &[]).await.unwrap_err();
        assert!(matches!(err, Error::DirectoryUnavailable(_)));
        assert!(directory.keys().is_empty());
    }

    #[test]
    fn test_from_provider_config() {
        let config = ProviderConfig {
            scheme: "mm".to_string(),
            service: "auth".to_string(),
            host: "10.0.0.1".to_string(),
            port: 9000,
            weight: 5,
            ttl: 30,
        };
        let options = RegisterOptions::from(&config);
        assert_eq!(options.weight, 5);
        assert_eq!(options.ttl, 30);
        assert_eq!(options.host, "10.0.0.1");
    }
}
