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
use srad_base::constants::{DEFAULT_TTL, DEFAULT_WEIGHT, MAX_WEIGHT};

use crate::{error::ConfigError, types::ConfigValidator};

/// What a provider publishes. An empty host means the local ip.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProviderConfig {
    pub scheme: String,
    pub service: String,
    pub host: String,
    pub port: u16,
    pub weight: i64,
    // seconds
    pub ttl: i64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            scheme: String::new(),
            service: String::new(),
            host: String::new(),
            port: 0,
            weight: DEFAULT_WEIGHT,
            ttl: DEFAULT_TTL,
        }
    }
}

impl ConfigValidator for ProviderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.weight <= 0 || self.weight > MAX_WEIGHT {
            return Err(ConfigError::invalid(
                "provider.weight",
                format!("must be within 1..={}, got {}", MAX_WEIGHT, self.weight),
            ));
        }
        if self.ttl <= 0 {
            return Err(ConfigError::invalid(
                "provider.ttl",
                format!("must be positive, got {}", self.ttl),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_bounds() {
        let mut config = ProviderConfig::default();
        assert!(config.validate().is_ok());

        config.weight = MAX_WEIGHT;
        assert!(config.validate().is_ok());

        config.weight = MAX_WEIGHT + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "provider.weight", .. })
        ));
    }
}
