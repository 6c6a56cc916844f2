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

use std::{collections::HashMap, path::PathBuf};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use srad_base::constants::SRAD_KEY;
use srad_logger::tracing;
use srad_utils::yaml_util::yaml_file_parser;

use crate::{
    error::ConfigError,
    location::get_config_location,
    types::{
        consumer::ConsumerConfig, logging::LoggingConfig, provider::ProviderConfig,
        registry::RegistryConfig, ConfigValidator,
    },
};

static SRAD_CONFIG: OnceCell<RootConfig> = OnceCell::new();

/// Root of the `srad` section of the yaml config file.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RootConfig {
    #[serde(skip)]
    pub location: PathBuf,

    pub registry: RegistryConfig,

    pub provider: ProviderConfig,

    pub consumer: ConsumerConfig,

    pub logging: LoggingConfig,
}

/// Loads the config file once per process, falling back to defaults when no file exists.
pub fn get_global_config() -> Result<&'static RootConfig, ConfigError> {
    SRAD_CONFIG.get_or_try_init(|| match RootConfig::load() {
        Err(ConfigError::NotFound(path)) => {
            tracing::info!("no config file at {:?}, using defaults", path);
            Ok(RootConfig::default())
        }
        other => other,
    })
}

impl RootConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(get_config_location())
    }

    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }
        tracing::debug!("loading config from {:?}", path);
        let mut conf: HashMap<String, RootConfig> =
            yaml_file_parser(path.clone()).map_err(|err| ConfigError::Parse {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        let mut root_config = conf
            .remove(SRAD_KEY)
            .ok_or_else(|| ConfigError::MissingRoot(path.clone()))?;
        root_config.location = path;
        root_config.validate()?;
        Ok(root_config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        let mut conf = HashMap::new();
        conf.insert(SRAD_KEY.to_string(), self.clone());
        serde_yaml::to_string(&conf).map_err(|err| ConfigError::Parse {
            path: self.location.clone(),
            reason: err.to_string(),
        })
    }
}

impl ConfigValidator for RootConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.registry.validate()?;
        self.provider.validate()?;
        self.consumer.validate()
    }
}
