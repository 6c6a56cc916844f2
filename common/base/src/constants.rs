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

pub const SRAD_KEY: &str = "srad";

pub const WEIGHT_KEY: &str = "weight";

pub const DEFAULT_WEIGHT: i64 = 1;

// upper bound for an entry weight; keeps picker credits far from overflow
pub const MAX_WEIGHT: i64 = 1_000_000;

// lease ttl in seconds
pub const DEFAULT_TTL: i64 = 10;

pub const DEFAULT_POOL_SIZE: usize = 4;

pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 3000;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

pub const DEFAULT_REGISTRY_PROTOCOL: &str = "etcd";

pub const DEFAULT_REGISTRY_ENDPOINT: &str = "127.0.0.1:2379";

pub const SMOOTH_WEIGHTED_ROUND_ROBIN: &str = "smooth_weighted_round_robin";

pub const DEFAULT_CONFIG_FILE: &str = "srad.yaml";

pub const ENV_SRAD_CONFIG_PATH: &str = "SRAD_CONFIG_PATH";

pub const ENV_SRAD_CONFIG_FILE: &str = "SRAD_CONFIG_FILE";

pub const ENV_SRAD_LOG_LEVEL: &str = "SRAD_LOG_LEVEL";

pub const LOGGING_LEVEL_KEY: &str = "srad.logging.level";
