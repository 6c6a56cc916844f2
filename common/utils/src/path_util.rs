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

use std::{env, path::PathBuf};

use srad_base::constants::{DEFAULT_CONFIG_FILE, ENV_SRAD_CONFIG_FILE, ENV_SRAD_CONFIG_PATH};

use crate::env_util::get_env_value;

pub fn app_root_dir() -> PathBuf {
    match project_root::get_project_root() {
        // Cargo.lock file as app root dir
        Ok(p) => p,
        Err(_) => env::current_dir().unwrap_or_default(),
    }
}

// resolve yaml config file
pub fn config_location() -> PathBuf {
    let dir = match get_env_value(ENV_SRAD_CONFIG_PATH) {
        Some(path) => PathBuf::from(path),
        None => app_root_dir(),
    };
    let file = get_env_value(ENV_SRAD_CONFIG_FILE).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    dir.join(file)
}
