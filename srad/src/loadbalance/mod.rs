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
use std::collections::HashMap;

use lazy_static::lazy_static;
use srad_base::constants::SMOOTH_WEIGHTED_ROUND_ROBIN;

use crate::{
    error::Error,
    loadbalance::{impls::smooth_weighted::SmoothWeightedPickerBuilder, types::BoxPickerBuilder},
};

pub mod impls;
pub mod types;

pub use types::{ArcPicker, ErrPicker, Metadata, PickFailure, Picker, PickerBuilder};

lazy_static! {
    pub static ref LOAD_BALANCE_EXTENSIONS: HashMap<String, BoxPickerBuilder> =
        init_loadbalance_extensions();
}

fn init_loadbalance_extensions() -> HashMap<String, BoxPickerBuilder> {
    let mut loadbalance_map: HashMap<String, BoxPickerBuilder> = HashMap::new();
    loadbalance_map.insert(
        SMOOTH_WEIGHTED_ROUND_ROBIN.to_string(),
        Box::new(SmoothWeightedPickerBuilder::default()),
    );
    loadbalance_map
}

pub fn get_picker_builder(name: &str) -> Result<&'static BoxPickerBuilder, Error> {
    LOAD_BALANCE_EXTENSIONS
        .get(name)
        .ok_or_else(|| Error::UnknownLoadBalance(name.to_string()))
}
