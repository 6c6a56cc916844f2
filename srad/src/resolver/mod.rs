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

//! Keeps a local copy of a service's address set in sync with the directory.
//!
//! A resolver reads a snapshot of the service prefix, then follows the change
//! stream from the revision right after the snapshot. Every effective change
//! is pushed to an [`AddressListener`] as the full new set, in the order the
//! directory reported it. The resolver never reconnects: when the watch ends
//! the listener is told and the owner decides what to do.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use srad_base::ServiceKey;
use srad_logger::tracing::{debug, info, warn};
use tokio::{
    select,
    sync::{mpsc, Notify},
};

use crate::{
    address::Address,
    directory::{
        BoxDirectoryClient, ConnectOptions, DirectoryClient, DirectoryConnector, EventType,
        WatchEvent, WatchStream,
    },
    error::Error,
};

pub trait AddressListener: Send + Sync {
    /// Receives the complete address set after every change.
    /// An error stops the resolver.
    fn update_state(&self, addresses: Vec<Address>) -> Result<(), Error>;

    /// Called once when the change stream closes or is canceled.
    fn on_watch_end(&self) {}
}

impl<L: AddressListener + ?Sized> AddressListener for Arc<L> {
    fn update_state(&self, addresses: Vec<Address>) -> Result<(), Error> {
        (**self).update_state(addresses)
    }

    fn on_watch_end(&self) {
        (**self).on_watch_end()
    }
}

impl AddressListener for mpsc::UnboundedSender<Vec<Address>> {
    fn update_state(&self, addresses: Vec<Address>) -> Result<(), Error> {
        self.send(addresses).map_err(|_| Error::ListenerClosed)
    }
}

/// Addresses in arrival order, unique by `addr`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    addresses: Vec<Address>,
}

impl AddressSet {
    pub fn insert(&mut self, address: Address) -> bool {
        if self.contains(&address.addr) {
            return false;
        }
        self.addresses.push(address);
        true
    }

    pub fn remove(&mut self, addr: &str) -> bool {
        match self.addresses.iter().position(|a| a.addr == addr) {
            Some(index) => {
                self.addresses.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.addresses.iter().any(|a| a.addr == addr)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Address> {
        self.addresses.clone()
    }
}

#[derive(Debug)]
pub struct Resolver {
    target: ServiceKey,
    client: BoxDirectoryClient,
    close: Arc<Notify>,
    closed: AtomicBool,
}

impl Resolver {
    pub async fn build<C, L>(
        target: ServiceKey,
        connector: &C,
        endpoints: &[String],
        listener: L,
        options: &ConnectOptions,
    ) -> Result<Self, Error>
    where
        C: DirectoryConnector + Sync + ?Sized,
        L: AddressListener + 'static,
    {
        let client = connector
            .connect(endpoints, options)
            .await
            .map_err(Error::directory)?;

        match start(&target, &client, listener, options).await {
            Ok(close) => Ok(Resolver {
                target,
                client,
                close,
                closed: AtomicBool::new(false),
            }),
            Err(err) => {
                client.close();
                Err(err)
            }
        }
    }

    pub fn target(&self) -> &ServiceKey {
        &self.target
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close.notify_one();
        self.client.close();
        debug!("resolver for {} closed", self.target);
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.close();
    }
}

async fn start<L>(
    target: &ServiceKey,
    client: &BoxDirectoryClient,
    listener: L,
    options: &ConnectOptions,
) -> Result<Arc<Notify>, Error>
where
    L: AddressListener + 'static,
{
    let prefix = target.prefix();
    let snapshot = tokio::time::timeout(options.request_timeout, client.get_prefix(&prefix))
        .await
        .map_err(|_| Error::directory(format!("reading {} timed out", prefix)))?
        .map_err(Error::directory)?;

    let mut addresses = AddressSet::default();
    for kv in &snapshot.kvs {
        let (key, address) = Address::from_key_value(kv)?;
        if key.service_key() != *target {
            debug!("skip {}, not an entry of {}", kv.key, target);
            continue;
        }
        address.parse_weight()?;
        addresses.insert(address);
    }

    let stream = client
        .watch_prefix(&prefix, snapshot.revision + 1)
        .await
        .map_err(Error::directory)?;

    info!(
        "resolved {} addresses for {} at revision {}",
        addresses.len(),
        target,
        snapshot.revision
    );
    listener.update_state(addresses.to_vec())?;

    let close = Arc::new(Notify::new());
    tokio::spawn(watch(target.clone(), addresses, stream, listener, close.clone()));
    Ok(close)
}

async fn watch<L>(
    target: ServiceKey,
    mut addresses: AddressSet,
    mut stream: WatchStream,
    listener: L,
    close: Arc<Notify>,
) where
    L: AddressListener,
{
    loop {
        let response = select! {
            biased;
            _ = close.notified() => {
                debug!("stop watching {}", target);
                return;
            },
            response = stream.recv() => response,
        };
        let Some(response) = response else {
            warn!("watch on {} closed", target);
            listener.on_watch_end();
            return;
        };

        for event in response.events {
            if !apply(&target, &mut addresses, event) {
                continue;
            }
            if let Err(err) = listener.update_state(addresses.to_vec()) {
                debug!("stop watching {}: {}", target, err);
                return;
            }
        }

        if response.canceled {
            warn!("watch on {} canceled", target);
            listener.on_watch_end();
            return;
        }
    }
}

// Returns whether the event changed the set.
fn apply(target: &ServiceKey, addresses: &mut AddressSet, event: WatchEvent) -> bool {
    let (key, address) = match Address::from_key_value(&event.kv) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("skip watch event on {}: {}", target, err);
            return false;
        }
    };
    if key.service_key() != *target {
        return false;
    }
    match event.event_type {
        EventType::Put => addresses.insert(address),
        EventType::Delete => addresses.remove(&address.addr),
    }
}
