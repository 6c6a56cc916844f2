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

use thiserror::Error;

use crate::StdError;

#[derive(Error, Debug)]
pub enum Error {
    /// Any request to the directory failed. Never retried by this crate.
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(#[source] StdError),

    #[error("malformed weight {weight:?} for address {addr}")]
    MalformedWeight { addr: String, weight: String },

    #[error("no addresses available")]
    NoAddressesAvailable,

    #[error("invalid directory key: {0}")]
    InvalidKey(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown load balance policy: {0}")]
    UnknownLoadBalance(String),

    #[error("address listener closed")]
    ListenerClosed,

    #[error("channel to {0} is shut down")]
    ChannelClosed(String),

    #[error("connection pool closed")]
    PoolClosed,

    #[error(transparent)]
    Config(#[from] srad_config::ConfigError),
}

impl Error {
    pub(crate) fn directory(err: impl Into<StdError>) -> Self {
        Error::DirectoryUnavailable(err.into())
    }
}
