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

//! A fixed ring of lazily built connections.
//!
//! `get` hands out slots round-robin without locking. A slot that is empty or
//! holds an unhealthy connection is rebuilt under the pool's reconnect lock;
//! the slot is checked again once the lock is held so concurrent callers
//! build it only once.

use std::{
    fmt::{Debug, Formatter},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use srad_logger::tracing::debug;
use tokio::sync::Mutex;

use crate::{channel::ConnectivityState, error::Error};

pub trait Connection: Send + Sync {
    fn state(&self) -> ConnectivityState;

    fn close(&self);

    fn is_healthy(&self) -> bool {
        !matches!(
            self.state(),
            ConnectivityState::TransientFailure | ConnectivityState::Shutdown
        )
    }
}

pub type ConnectionFactory<C> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<C, Error>> + Send + Sync + 'static>;

pub struct ConnectionPool<C> {
    slots: Vec<ArcSwapOption<C>>,
    cursor: AtomicUsize,
    reconnect: Mutex<()>,
    factory: ConnectionFactory<C>,
    closed: AtomicBool,
}

impl<C: Connection> ConnectionPool<C> {
    pub fn new(size: usize, factory: ConnectionFactory<C>) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidArgument("pool size must be positive".to_string()));
        }
        Ok(ConnectionPool {
            slots: (0..size).map(|_| ArcSwapOption::empty()).collect(),
            cursor: AtomicUsize::new(0),
            reconnect: Mutex::new(()),
            factory,
            closed: AtomicBool::new(false),
        })
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub async fn get(&self) -> Result<Arc<C>, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let slot = &self.slots[index];
        if let Some(conn) = slot.load_full() {
            if conn.is_healthy() {
                return Ok(conn);
            }
        }

        let _guard = self.reconnect.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }
        if let Some(stale) = slot.swap(None) {
            if stale.is_healthy() {
                // rebuilt while we waited
                slot.store(Some(stale.clone()));
                return Ok(stale);
            }
            debug!("replace connection in slot {}, state {:?}", index, stale.state());
            stale.close();
        }

        let conn = Arc::new((self.factory)().await?);
        slot.store(Some(conn.clone()));
        if self.closed.load(Ordering::SeqCst) {
            slot.store(None);
            conn.close();
            return Err(Error::PoolClosed);
        }
        Ok(conn)
    }

    /// Closes every connection; later `get` calls fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for slot in &self.slots {
            if let Some(conn) = slot.swap(None) {
                conn.close();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<C> Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("size", &self.slots.len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU8;

    use super::*;

    #[derive(Debug)]
    struct MockConnection {
        id: usize,
        state: AtomicU8,
    }

    impl MockConnection {
        fn set_state(&self, state: ConnectivityState) {
            self.state.store(state as u8, Ordering::SeqCst);
        }
    }

    impl Connection for MockConnection {
        fn state(&self) -> ConnectivityState {
            self.state.load(Ordering::SeqCst).into()
        }

        fn close(&self) {
            self.set_state(ConnectivityState::Shutdown);
        }
    }

    fn factory(built: Arc<AtomicUsize>, fail: Arc<AtomicBool>) -> ConnectionFactory<MockConnection> {
        Arc::new(move || -> BoxFuture<'static, Result<MockConnection, Error>> {
            let built = built.clone();
            let fail = fail.clone();
            Box::pin(async move {
                if fail.load(Ordering::SeqCst) {
                    return Err(Error::NoAddressesAvailable);
                }
                Ok(MockConnection {
                    id: built.fetch_add(1, Ordering::SeqCst),
                    state: AtomicU8::new(ConnectivityState::Ready as u8),
                })
            })
        })
    }

    #[tokio::test]
    async fn test_slots_are_lazy_and_reused() {
        let built = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(2, factory(built.clone(), Default::default())).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let first = pool.get().await.unwrap();
        let second = pool.get().await.unwrap();
        let third = pool.get().await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_ne!(first.id, second.id);
        assert!(Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_unhealthy_connection_is_replaced() {
        let built = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(1, factory(built.clone(), Default::default())).unwrap();

        let first = pool.get().await.unwrap();
        first.set_state(ConnectivityState::TransientFailure);
        let second = pool.get().await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.state(), ConnectivityState::Shutdown);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_factory_error_leaves_slot_empty() {
        let built = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(true));
        let pool = ConnectionPool::new(1, factory(built.clone(), fail.clone())).unwrap();

        assert!(matches!(pool.get().await, Err(Error::NoAddressesAvailable)));
        fail.store(false, Ordering::SeqCst);
        assert!(pool.get().await.is_ok());
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_builds_each_slot_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(ConnectionPool::new(4, factory(built.clone(), Default::default())).unwrap());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.get().await.map(|conn| conn.id) })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(built.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_close() {
        let built = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(2, factory(built, Default::default())).unwrap();
        let conn = pool.get().await.unwrap();

        pool.close();
        assert!(pool.is_closed());
        assert_eq!(conn.state(), ConnectivityState::Shutdown);
        assert!(matches!(pool.get().await, Err(Error::PoolClosed)));
    }

    #[test]
    fn test_zero_size() {
        let built = Arc::new(AtomicUsize::new(0));
        let err = ConnectionPool::new(0, factory(built, Default::default())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
