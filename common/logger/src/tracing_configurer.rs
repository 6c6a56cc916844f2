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

use srad_base::constants::{ENV_SRAD_LOG_LEVEL, LOGGING_LEVEL_KEY};
use srad_utils::{env_util::get_env_value, path_util::config_location, yaml_util::yaml_key_reader};

use crate::{level::LevelWrapper, Level};

pub(crate) fn default() {
    let level = configured_level().unwrap_or(Level::INFO);
    let result = tracing_subscriber::fmt()
        .compact()
        .with_max_level(level)
        .with_thread_names(false)
        .with_line_number(true)
        // sets this to be the default, global collector for this application.
        .try_init();
    if let Err(err) = result {
        eprintln!("srad-logger: global subscriber already set: {}", err);
    }
}

// env first, then the logging section of the config file
pub(crate) fn configured_level() -> Option<Level> {
    if let Some(level) = get_env_value(ENV_SRAD_LOG_LEVEL) {
        return Some(LevelWrapper::from(level).inner);
    }
    parse_from_config()
}

pub(crate) fn parse_from_config() -> Option<Level> {
    let path = config_location();
    if !path.is_file() {
        return None;
    }
    match yaml_key_reader(path, LOGGING_LEVEL_KEY) {
        Ok(Some(level)) => Some(LevelWrapper::from(level).inner),
        _ => None,
    }
}
