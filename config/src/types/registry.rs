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

use serde::{Deserialize, Serialize};
use srad_base::constants::{
    DEFAULT_DIAL_TIMEOUT_MS, DEFAULT_REGISTRY_ENDPOINT, DEFAULT_REGISTRY_PROTOCOL,
    DEFAULT_REQUEST_TIMEOUT_MS,
};

use crate::{error::ConfigError, types::ConfigValidator};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct RegistryConfig {
    pub protocol: String,
    pub endpoints: Vec<String>,
    // milliseconds
    pub dial_timeout: u64,
    // milliseconds, bounds the snapshot read
    pub request_timeout: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            protocol: DEFAULT_REGISTRY_PROTOCOL.to_string(),
            endpoints: vec![DEFAULT_REGISTRY_ENDPOINT.to_string()],
            dial_timeout: DEFAULT_DIAL_TIMEOUT_MS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ConfigValidator for RegistryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.trim().is_empty() {
            return Err(ConfigError::invalid("registry.protocol", "must not be empty"));
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::invalid("registry.endpoints", "must not be empty"));
        }
        if self.dial_timeout == 0 {
            return Err(ConfigError::invalid("registry.dial-timeout", "must be positive"));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::invalid("registry.request-timeout", "must be positive"));
        }
        Ok(())
    }
}
