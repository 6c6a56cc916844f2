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

//! An in-process directory with revisions, leases and prefix watches.
//!
//! Mirrors the behavior of an etcd cluster closely enough to run registrars
//! and resolvers against it: every mutation bumps the revision, DELETE events
//! carry only the key, leases expire `ttl` seconds after the last keepalive
//! and take their keys with them.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use srad_logger::tracing::debug;
use tokio::{sync::mpsc, time::Instant};

use crate::{
    directory::{
        BoxDirectoryClient, ConnectOptions, DirectoryClient, DirectoryConnector, EventType,
        KeepAliveAck, KeepAliveStream, KeyValue, LeaseId, Snapshot, WatchEvent, WatchResponse,
        WatchStream,
    },
    StdError,
};

const HISTORY_LIMIT: usize = 1024;

#[derive(Debug)]
struct Lease {
    ttl: i64,
    deadline: Instant,
    keys: HashSet<String>,
    severed: bool,
}

#[derive(Debug)]
struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchResponse>,
}

#[derive(Debug, Default)]
struct State {
    revision: i64,
    // newest revision no longer kept in history
    compacted: i64,
    next_lease: LeaseId,
    kvs: BTreeMap<String, KeyValue>,
    history: VecDeque<(i64, WatchEvent)>,
    leases: HashMap<LeaseId, Lease>,
    watchers: Vec<Watcher>,
    unavailable: bool,
    refuse_keep_alive: bool,
}

impl State {
    fn apply(&mut self, event_type: EventType, kv: KeyValue) {
        self.revision += 1;
        let event = WatchEvent { event_type, kv };
        self.history.push_back((self.revision, event.clone()));
        if self.history.len() > HISTORY_LIMIT {
            if let Some((revision, _)) = self.history.pop_front() {
                self.compacted = revision;
            }
        }

        self.watchers.retain(|watcher| {
            if watcher.tx.is_closed() {
                return false;
            }
            if !event.kv.key.starts_with(&watcher.prefix) {
                return true;
            }
            watcher
                .tx
                .send(WatchResponse {
                    canceled: false,
                    events: vec![event.clone()],
                })
                .is_ok()
        });
    }

    fn put(&mut self, key: &str, value: &str, lease: LeaseId) -> Result<(), StdError> {
        if lease != 0 && !self.leases.contains_key(&lease) {
            return Err(format!("lease {} not found", lease).into());
        }
        if let Some(prev) = self.kvs.get(key) {
            if prev.lease != 0 && prev.lease != lease {
                if let Some(prev_lease) = self.leases.get_mut(&prev.lease) {
                    prev_lease.keys.remove(key);
                }
            }
        }
        if let Some(current) = self.leases.get_mut(&lease) {
            current.keys.insert(key.to_string());
        }

        let kv = KeyValue {
            key: key.to_string(),
            value: value.to_string(),
            lease,
        };
        self.kvs.insert(key.to_string(), kv.clone());
        self.apply(EventType::Put, kv);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> bool {
        if self.kvs.remove(key).is_none() {
            return false;
        }
        self.apply(
            EventType::Delete,
            KeyValue {
                key: key.to_string(),
                value: String::new(),
                lease: 0,
            },
        );
        true
    }

    fn drop_lease(&mut self, id: LeaseId) -> bool {
        let Some(lease) = self.leases.remove(&id) else {
            return false;
        };
        let mut keys: Vec<String> = lease.keys.into_iter().collect();
        keys.sort();
        for key in keys {
            self.delete(&key);
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
    connects: Arc<AtomicUsize>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every new connection and every request of open clients fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Makes every keepalive request fail while other requests still succeed.
    pub fn set_keep_alive_refused(&self, refused: bool) {
        self.state().refuse_keep_alive = refused;
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn revision(&self) -> i64 {
        self.state().revision
    }

    pub fn put(&self, key: &str, value: &str) {
        // without a lease the put cannot fail
        let _ = self.state().put(key, value, 0);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.state().delete(key)
    }

    pub fn get(&self, key: &str) -> Option<KeyValue> {
        self.state().kvs.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().kvs.keys().cloned().collect()
    }

    pub fn lease_count(&self) -> usize {
        self.state().leases.len()
    }

    pub fn watcher_count(&self) -> usize {
        let mut state = self.state();
        state.watchers.retain(|watcher| !watcher.tx.is_closed());
        state.watchers.len()
    }

    /// Stops refreshing the lease, closing its keepalive streams on their next tick.
    pub fn sever_keep_alive(&self, lease: LeaseId) {
        if let Some(lease) = self.state().leases.get_mut(&lease) {
            lease.severed = true;
        }
    }

    /// Cancels every open watch from the directory side.
    pub fn cancel_watches(&self) {
        let watchers = std::mem::take(&mut self.state().watchers);
        for watcher in watchers {
            let _ = watcher.tx.send(WatchResponse {
                canceled: true,
                events: Vec::new(),
            });
        }
    }

    fn check_available(&self) -> Result<(), StdError> {
        if self.state().unavailable {
            return Err("directory unavailable".into());
        }
        Ok(())
    }

    fn grant(&self, ttl: i64) -> Result<LeaseId, StdError> {
        if ttl <= 0 {
            return Err(format!("invalid lease ttl {}", ttl).into());
        }
        let id = {
            let mut state = self.state();
            state.next_lease += 1;
            let id = state.next_lease;
            state.leases.insert(
                id,
                Lease {
                    ttl,
                    deadline: Instant::now() + Duration::from_secs(ttl as u64),
                    keys: HashSet::new(),
                    severed: false,
                },
            );
            id
        };
        self.spawn_expiry(id);
        Ok(id)
    }

    fn spawn_expiry(&self, id: LeaseId) {
        let directory = self.clone();
        tokio::spawn(async move {
            loop {
                let deadline = match directory.state().leases.get(&id) {
                    Some(lease) => lease.deadline,
                    None => return,
                };
                tokio::time::sleep_until(deadline).await;

                let mut state = directory.state();
                let expired = match state.leases.get(&id) {
                    Some(lease) => lease.deadline <= Instant::now(),
                    None => return,
                };
                if expired {
                    debug!("lease {} expired", id);
                    state.drop_lease(id);
                    return;
                }
            }
        });
    }

    fn keep_alive(&self, id: LeaseId) -> Result<KeepAliveStream, StdError> {
        if self.state().refuse_keep_alive {
            return Err("keepalive refused".into());
        }
        let ttl = match self.state().leases.get(&id) {
            Some(lease) => lease.ttl,
            None => return Err(format!("lease {} not found", id).into()),
        };
        let period = Duration::from_millis((ttl as u64 * 1000 / 3).max(1));
        let (tx, rx) = mpsc::channel(16);
        let directory = self.clone();
        tokio::spawn(async move {
            loop {
                let ack = {
                    let mut state = directory.state();
                    match state.leases.get_mut(&id) {
                        Some(lease) if !lease.severed => {
                            lease.deadline = Instant::now() + Duration::from_secs(lease.ttl as u64);
                            KeepAliveAck {
                                lease: id,
                                ttl: lease.ttl,
                            }
                        }
                        _ => break,
                    }
                };
                if tx.send(ack).await.is_err() {
                    break;
                }
                tokio::time::sleep(period).await;
            }
            debug!("keepalive for lease {} stopped", id);
        });
        Ok(rx)
    }

    fn watch(&self, prefix: &str, start_revision: i64) -> WatchStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        if start_revision > 0 {
            if start_revision <= state.compacted {
                let _ = tx.send(WatchResponse {
                    canceled: true,
                    events: Vec::new(),
                });
                return rx;
            }
            for (revision, event) in state.history.iter() {
                if *revision >= start_revision && event.kv.key.starts_with(prefix) {
                    let _ = tx.send(WatchResponse {
                        canceled: false,
                        events: vec![event.clone()],
                    });
                }
            }
        }
        state.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        rx
    }
}

#[async_trait]
impl DirectoryConnector for MemoryDirectory {
    async fn connect(
        &self,
        _endpoints: &[String],
        _options: &ConnectOptions,
    ) -> Result<BoxDirectoryClient, StdError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(Arc::new(MemoryClient {
            directory: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
pub struct MemoryClient {
    directory: MemoryDirectory,
    closed: AtomicBool,
}

impl MemoryClient {
    fn check(&self) -> Result<(), StdError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("client closed".into());
        }
        self.directory.check_available()
    }
}

#[async_trait]
impl DirectoryClient for MemoryClient {
    async fn grant(&self, ttl: i64) -> Result<LeaseId, StdError> {
        self.check()?;
        self.directory.grant(ttl)
    }

    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<(), StdError> {
        self.check()?;
        self.directory.state().put(key, value, lease)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, StdError> {
        self.check()?;
        self.directory.keep_alive(lease)
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), StdError> {
        self.check()?;
        if self.directory.state().drop_lease(lease) {
            Ok(())
        } else {
            Err(format!("lease {} not found", lease).into())
        }
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Snapshot, StdError> {
        self.check()?;
        let state = self.directory.state();
        let kvs = state
            .kvs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, kv)| kv.clone())
            .collect();
        Ok(Snapshot {
            revision: state.revision,
            kvs,
        })
    }

    async fn watch_prefix(&self, prefix: &str, start_revision: i64) -> Result<WatchStream, StdError> {
        self.check()?;
        Ok(self.directory.watch(prefix, start_revision))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn client(directory: &MemoryDirectory) -> BoxDirectoryClient {
        directory
            .connect(&[], &ConnectOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_prefix() {
        let directory = MemoryDirectory::new();
        let client = client(&directory).await;
        client.put("mm:///auth/a:1", "a:1", 0).await.unwrap();
        client.put("mm:///auth/b:1", "b:1", 0).await.unwrap();
        client.put("mm:///authz/c:1", "c:1", 0).await.unwrap();

        let snapshot = client.get_prefix("mm:///auth/").await.unwrap();
        assert_eq!(snapshot.revision, 3);
        let keys: Vec<_> = snapshot.kvs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["mm:///auth/a:1", "mm:///auth/b:1"]);
    }

    #[tokio::test]
    async fn test_watch_delivers_put_and_delete() {
        let directory = MemoryDirectory::new();
        let client = client(&directory).await;
        let mut stream = client.watch_prefix("mm:///auth/", 0).await.unwrap();

        directory.put("mm:///auth/a:1", "a:1");
        directory.put("mm:///other/b:1", "b:1");
        assert!(directory.delete("mm:///auth/a:1"));

        let put = stream.recv().await.unwrap();
        assert_eq!(put.events[0].event_type, EventType::Put);
        assert_eq!(put.events[0].kv.value, "a:1");
        let delete = stream.recv().await.unwrap();
        assert_eq!(delete.events[0].event_type, EventType::Delete);
        assert_eq!(delete.events[0].kv.key, "mm:///auth/a:1");
        assert!(delete.events[0].kv.value.is_empty());
    }

    #[tokio::test]
    async fn test_watch_replays_from_revision() {
        let directory = MemoryDirectory::new();
        directory.put("mm:///auth/a:1", "a:1");
        directory.put("mm:///auth/b:1", "b:1");

        let client = client(&directory).await;
        let mut stream = client.watch_prefix("mm:///auth/", 2).await.unwrap();
        let replayed = stream.recv().await.unwrap();
        assert_eq!(replayed.events[0].kv.key, "mm:///auth/b:1");
        assert!(stream.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_watches() {
        let directory = MemoryDirectory::new();
        let client = client(&directory).await;
        let mut stream = client.watch_prefix("mm:///auth/", 0).await.unwrap();
        assert_eq!(directory.watcher_count(), 1);

        directory.cancel_watches();
        assert!(stream.recv().await.unwrap().canceled);
        assert!(stream.recv().await.is_none());
        assert_eq!(directory.watcher_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expires_without_keepalive() {
        let directory = MemoryDirectory::new();
        let client = client(&directory).await;
        let lease = client.grant(10).await.unwrap();
        client.put("mm:///auth/a:1", "a:1", lease).await.unwrap();

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(directory.get("mm:///auth/a:1").is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(directory.get("mm:///auth/a:1").is_none());
        assert_eq!(directory.lease_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_holds_lease_until_severed() {
        let directory = MemoryDirectory::new();
        let client = client(&directory).await;
        let lease = client.grant(3).await.unwrap();
        client.put("mm:///auth/a:1", "a:1", lease).await.unwrap();
        let mut acks = client.keep_alive(lease).await.unwrap();

        let drain = tokio::spawn(async move {
            let mut count = 0;
            while acks.recv().await.is_some() {
                count += 1;
            }
            count
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(directory.get("mm:///auth/a:1").is_some());

        directory.sever_keep_alive(lease);
        let acks = drain.await.unwrap();
        assert!(acks > 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(directory.get("mm:///auth/a:1").is_none());
    }

    #[tokio::test]
    async fn test_revoke_deletes_keys() {
        let directory = MemoryDirectory::new();
        let client = client(&directory).await;
        let lease = client.grant(10).await.unwrap();
        client.put("mm:///auth/a:1", "a:1", lease).await.unwrap();

        client.revoke(lease).await.unwrap();
        assert!(directory.keys().is_empty());
        assert!(client.revoke(lease).await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_and_closed() {
        let directory = MemoryDirectory::new();
        let client = client(&directory).await;

        directory.set_unavailable(true);
        assert!(client.get_prefix("mm:///").await.is_err());
        assert!(directory
            .connect(&[], &ConnectOptions::default())
            .await
            .is_err());

        directory.set_unavailable(false);
        client.close();
        assert!(client.grant(1).await.is_err());
        assert_eq!(directory.connect_count(), 2);
    }
}
