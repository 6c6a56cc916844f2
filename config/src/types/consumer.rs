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
use srad_base::constants::{DEFAULT_POOL_SIZE, SMOOTH_WEIGHTED_ROUND_ROBIN};

use crate::{error::ConfigError, types::ConfigValidator};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConsumerConfig {
    pub pool_size: usize,
    pub load_balance: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            pool_size: DEFAULT_POOL_SIZE,
            load_balance: SMOOTH_WEIGHTED_ROUND_ROBIN.to_string(),
        }
    }
}

impl ConfigValidator for ConsumerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::invalid("consumer.pool-size", "must be positive"));
        }
        if self.load_balance.trim().is_empty() {
            return Err(ConfigError::invalid("consumer.load-balance", "must not be empty"));
        }
        Ok(())
    }
}
