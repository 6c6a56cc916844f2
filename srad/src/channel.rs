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

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use arc_swap::ArcSwap;
use srad_base::ServiceKey;
use srad_logger::tracing::debug;

use crate::{
    address::Address,
    directory::{ConnectOptions, DirectoryConnector},
    error::Error,
    loadbalance::{types::BoxPickerBuilder, ArcPicker, ErrPicker, PickFailure},
    pool::Connection,
    resolver::{AddressListener, Resolver},
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle = 0,
    Connecting = 1,
    Ready = 2,
    TransientFailure = 3,
    Shutdown = 4,
}

impl From<u8> for ConnectivityState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConnectivityState::Idle,
            1 => ConnectivityState::Connecting,
            2 => ConnectivityState::Ready,
            3 => ConnectivityState::TransientFailure,
            _ => ConnectivityState::Shutdown,
        }
    }
}

/// Turns address-set updates into pickers. Shared by the channel and its resolver.
#[derive(Debug)]
struct Balancer {
    target: ServiceKey,
    builder: &'static BoxPickerBuilder,
    picker: ArcSwap<ArcPicker>,
    state: AtomicU8,
}

impl Balancer {
    fn new(target: ServiceKey, builder: &'static BoxPickerBuilder) -> Self {
        let picker: ArcPicker = Arc::new(ErrPicker::new(PickFailure::NoAddresses));
        Balancer {
            target,
            builder,
            picker: ArcSwap::from_pointee(picker),
            state: AtomicU8::new(ConnectivityState::Idle as u8),
        }
    }

    fn state(&self) -> ConnectivityState {
        self.state.load(Ordering::SeqCst).into()
    }

    // Shutdown is final.
    fn transition(&self, next: ConnectivityState) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != ConnectivityState::Shutdown as u8).then_some(next as u8)
            })
            .is_ok()
    }

    fn pick(&self) -> Result<Address, Error> {
        if self.state() == ConnectivityState::Shutdown {
            return Err(Error::ChannelClosed(self.target.to_string()));
        }
        self.picker.load().pick()
    }
}

impl AddressListener for Balancer {
    fn update_state(&self, addresses: Vec<Address>) -> Result<(), Error> {
        let next = if addresses.is_empty() {
            ConnectivityState::TransientFailure
        } else {
            ConnectivityState::Ready
        };
        if self.state() == ConnectivityState::Shutdown {
            return Err(Error::ChannelClosed(self.target.to_string()));
        }
        self.picker.store(Arc::new(self.builder.build(&addresses)));
        self.transition(next);
        debug!("{} has {} addresses, {:?}", self.target, addresses.len(), next);
        Ok(())
    }

    fn on_watch_end(&self) {
        if self.transition(ConnectivityState::TransientFailure) {
            debug!("{} lost its watch", self.target);
        }
    }
}

/// A logical connection to one service: a resolver feeding a picker.
#[derive(Debug)]
pub struct Channel {
    balancer: Arc<Balancer>,
    resolver: Resolver,
}

impl Channel {
    pub async fn connect<C>(
        target: ServiceKey,
        connector: &C,
        endpoints: &[String],
        builder: &'static BoxPickerBuilder,
        options: &ConnectOptions,
    ) -> Result<Self, Error>
    where
        C: DirectoryConnector + Sync + ?Sized,
    {
        let balancer = Arc::new(Balancer::new(target.clone(), builder));
        balancer.transition(ConnectivityState::Connecting);
        let resolver =
            Resolver::build(target, connector, endpoints, balancer.clone(), options).await?;
        Ok(Channel { balancer, resolver })
    }

    pub fn target(&self) -> &ServiceKey {
        &self.balancer.target
    }

    pub fn state(&self) -> ConnectivityState {
        self.balancer.state()
    }

    /// Picks the address for one call.
    pub fn pick(&self) -> Result<Address, Error> {
        self.balancer.pick()
    }

    pub fn close(&self) {
        self.balancer.state.store(ConnectivityState::Shutdown as u8, Ordering::SeqCst);
        self.resolver.close();
    }
}

impl Connection for Channel {
    fn state(&self) -> ConnectivityState {
        Channel::state(self)
    }

    fn close(&self) {
        Channel::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{directory::memory::MemoryDirectory, loadbalance::get_picker_builder};
    use srad_base::constants::SMOOTH_WEIGHTED_ROUND_ROBIN;

    async fn channel(directory: &MemoryDirectory) -> Result<Channel, Error> {
        let builder = get_picker_builder(SMOOTH_WEIGHTED_ROUND_ROBIN)?;
        Channel::connect(
            ServiceKey::new("mm", "auth"),
            directory,
            &[],
            builder,
            &ConnectOptions::default(),
        )
        .await
    }

    #[tokio::test]
    async fn test_channel_picks_from_snapshot() {
        let directory = MemoryDirectory::new();
        directory.put("mm:///auth/a:1?weight=1", "a:1");
        directory.put("mm:///auth/b:1?weight=3", "b:1");

        let channel = channel(&directory).await.unwrap();
        assert_eq!(channel.state(), ConnectivityState::Ready);
        let picks: Vec<_> = (0..4).map(|_| channel.pick().unwrap().addr).collect();
        assert_eq!(picks, vec!["b:1", "b:1", "a:1", "b:1"]);
    }

    #[tokio::test]
    async fn test_empty_channel() {
        let directory = MemoryDirectory::new();
        let channel = channel(&directory).await.unwrap();
        assert_eq!(channel.state(), ConnectivityState::TransientFailure);
        assert!(matches!(channel.pick(), Err(Error::NoAddressesAvailable)));
    }

    #[tokio::test]
    async fn test_channel_follows_watch() {
        let directory = MemoryDirectory::new();
        directory.put("mm:///auth/a:1", "a:1");
        let channel = channel(&directory).await.unwrap();

        directory.put("mm:///auth/b:1?weight=x", "b:1");
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if channel.pick().is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(matches!(channel.pick(), Err(Error::MalformedWeight { .. })));

        directory.delete("mm:///auth/b:1?weight=x");
        for _ in 0..10 {
            if channel.pick().is_ok() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(channel.pick().unwrap().addr, "a:1");
    }

    #[tokio::test]
    async fn test_watch_end_and_close() {
        let directory = MemoryDirectory::new();
        directory.put("mm:///auth/a:1", "a:1");
        let channel = channel(&directory).await.unwrap();

        directory.cancel_watches();
        for _ in 0..10 {
            if channel.state() == ConnectivityState::TransientFailure {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(channel.state(), ConnectivityState::TransientFailure);
        // the last picker keeps serving
        assert_eq!(channel.pick().unwrap().addr, "a:1");

        channel.close();
        assert_eq!(channel.state(), ConnectivityState::Shutdown);
        assert!(matches!(channel.pick(), Err(Error::ChannelClosed(_))));
    }
}
