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

//! The boundary to the external key-value directory.
//!
//! The directory itself (storage, consensus, persistence) is not part of this
//! crate. A [`DirectoryConnector`] opens a [`DirectoryClient`] for a set of
//! endpoints; everything above this module talks to the directory only
//! through these two traits. Keys and values cross the boundary as owned
//! strings.

pub mod memory;

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use srad_base::constants::{DEFAULT_DIAL_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS};
use srad_config::RegistryConfig;
use tokio::sync::mpsc;

use crate::StdError;

pub type LeaseId = i64;

/// Ordered stream of watch responses. Dropping the receiver cancels the watch.
pub type WatchStream = mpsc::UnboundedReceiver<WatchResponse>;

/// Keepalive acknowledgements; closed when the lease is lost or revoked.
pub type KeepAliveStream = mpsc::Receiver<KeepAliveAck>;

pub type BoxDirectoryConnector = Arc<dyn DirectoryConnector + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    // 0 when the key is not attached to a lease
    pub lease: LeaseId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: i64,
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub kv: KeyValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchResponse {
    pub canceled: bool,
    pub events: Vec<WatchEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveAck {
    pub lease: LeaseId,
    pub ttl: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub dial_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            dial_timeout: Duration::from_millis(DEFAULT_DIAL_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl From<&RegistryConfig> for ConnectOptions {
    fn from(config: &RegistryConfig) -> Self {
        ConnectOptions {
            dial_timeout: Duration::from_millis(config.dial_timeout),
            request_timeout: Duration::from_millis(config.request_timeout),
        }
    }
}

#[async_trait]
pub trait DirectoryClient: Debug {
    async fn grant(&self, ttl: i64) -> Result<LeaseId, StdError>;

    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<(), StdError>;

    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, StdError>;

    async fn revoke(&self, lease: LeaseId) -> Result<(), StdError>;

    async fn get_prefix(&self, prefix: &str) -> Result<Snapshot, StdError>;

    /// Watches every key under `prefix`, starting at `start_revision` when it is positive.
    async fn watch_prefix(&self, prefix: &str, start_revision: i64) -> Result<WatchStream, StdError>;

    fn close(&self);
}

pub type BoxDirectoryClient = Arc<dyn DirectoryClient + Send + Sync + 'static>;

#[async_trait]
pub trait DirectoryConnector {
    async fn connect(
        &self,
        endpoints: &[String],
        options: &ConnectOptions,
    ) -> Result<BoxDirectoryClient, StdError>;
}
