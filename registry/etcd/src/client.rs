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
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use etcd_client::{
    Client, ConnectOptions as EtcdConnectOptions, EventType as EtcdEventType, GetOptions,
    PutOptions, WatchOptions,
};
use srad::{
    directory::{
        BoxDirectoryClient, ConnectOptions, DirectoryClient, DirectoryConnector, EventType,
        KeepAliveAck, KeepAliveStream, KeyValue, LeaseId, Snapshot, WatchEvent, WatchResponse,
        WatchStream,
    },
    StdError,
};
use srad_logger::tracing::{debug, warn};
use tokio::{select, sync::mpsc};

/// Opens [`EtcdClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct EtcdConnector;

#[async_trait]
impl DirectoryConnector for EtcdConnector {
    async fn connect(
        &self,
        endpoints: &[String],
        options: &ConnectOptions,
    ) -> Result<BoxDirectoryClient, StdError> {
        if endpoints.is_empty() {
            return Err("no etcd endpoints".into());
        }
        let etcd_options = EtcdConnectOptions::new()
            .with_connect_timeout(options.dial_timeout)
            .with_timeout(options.request_timeout);
        let client = Client::connect(endpoints, Some(etcd_options)).await?;
        debug!("connected to etcd {:?}", endpoints);
        Ok(Arc::new(EtcdClient {
            client,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct EtcdClient {
    client: Client,
    closed: AtomicBool,
}

impl std::fmt::Debug for EtcdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdClient")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl EtcdClient {
    // etcd requests take the client mutably; clones share the connection
    fn client(&self) -> Result<Client, StdError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("etcd client closed".into());
        }
        Ok(self.client.clone())
    }
}

fn key_value(kv: &etcd_client::KeyValue) -> KeyValue {
    KeyValue {
        key: String::from_utf8_lossy(kv.key()).into_owned(),
        value: String::from_utf8_lossy(kv.value()).into_owned(),
        lease: kv.lease(),
    }
}

fn watch_response(resp: &etcd_client::WatchResponse) -> WatchResponse {
    let events = resp
        .events()
        .iter()
        .filter_map(|event| {
            let kv = event.kv()?;
            let event_type = match event.event_type() {
                EtcdEventType::Put => EventType::Put,
                EtcdEventType::Delete => EventType::Delete,
            };
            Some(WatchEvent {
                event_type,
                kv: key_value(kv),
            })
        })
        .collect();
    WatchResponse {
        canceled: resp.canceled(),
        events,
    }
}

#[async_trait]
impl DirectoryClient for EtcdClient {
    async fn grant(&self, ttl: i64) -> Result<LeaseId, StdError> {
        let resp = self.client()?.lease_grant(ttl, None).await?;
        Ok(resp.id())
    }

    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<(), StdError> {
        let options = (lease != 0).then(|| PutOptions::new().with_lease(lease));
        self.client()?.put(key, value, options).await?;
        Ok(())
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, StdError> {
        let (mut keeper, mut stream) = self.client()?.lease_keep_alive(lease).await?;
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            loop {
                if let Err(err) = keeper.keep_alive().await {
                    warn!("keepalive request for lease {} failed: {}", lease, err);
                    break;
                }
                let ack = match stream.message().await {
                    Ok(Some(resp)) if resp.ttl() > 0 => KeepAliveAck {
                        lease: resp.id(),
                        ttl: resp.ttl(),
                    },
                    Ok(Some(_)) => {
                        warn!("lease {} is gone", lease);
                        break;
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("keepalive stream for lease {} failed: {}", lease, err);
                        break;
                    }
                };
                let period = Duration::from_millis((ack.ttl as u64 * 1000 / 3).max(500));
                if tx.send(ack).await.is_err() {
                    break;
                }
                select! {
                    _ = tokio::time::sleep(period) => {},
                    _ = tx.closed() => break,
                }
            }
            debug!("stop keeping lease {} alive", lease);
        });
        Ok(rx)
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), StdError> {
        self.client()?.lease_revoke(lease).await?;
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Snapshot, StdError> {
        let resp = self
            .client()?
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        let revision = resp.header().map(|header| header.revision()).unwrap_or_default();
        Ok(Snapshot {
            revision,
            kvs: resp.kvs().iter().map(key_value).collect(),
        })
    }

    async fn watch_prefix(&self, prefix: &str, start_revision: i64) -> Result<WatchStream, StdError> {
        let mut options = WatchOptions::new().with_prefix();
        if start_revision > 0 {
            options = options.with_start_revision(start_revision);
        }
        let (mut watcher, mut stream) = self.client()?.watch(prefix, Some(options)).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let prefix = prefix.to_string();
        tokio::spawn(async move {
            loop {
                select! {
                    _ = tx.closed() => {
                        if let Err(err) = watcher.cancel().await {
                            debug!("cancel watch on {}: {}", prefix, err);
                        }
                        break;
                    },
                    message = stream.message() => match message {
                        Ok(Some(resp)) => {
                            let resp = watch_response(&resp);
                            let canceled = resp.canceled;
                            if tx.send(resp).is_err() || canceled {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            warn!("watch on {} failed: {}", prefix, err);
                            break;
                        }
                    },
                }
            }
            debug!("watch on {} ended", prefix);
        });
        Ok(rx)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
