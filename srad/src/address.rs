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

use srad_base::{
    constants::{DEFAULT_WEIGHT, MAX_WEIGHT},
    EntryKey,
};

use crate::{
    directory::{KeyValue, LeaseId},
    error::Error,
};

/// One published instance of a service.
///
/// `weight` keeps the raw query parameter of the directory key; it is
/// interpreted by the picker, where an empty value means the default weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub addr: String,
    pub weight: String,
    pub lease: LeaseId,
}

impl Address {
    pub fn new(addr: impl Into<String>, weight: impl Into<String>) -> Self {
        Address {
            addr: addr.into(),
            weight: weight.into(),
            lease: 0,
        }
    }

    /// Builds an address from a directory entry. The value holds the
    /// address; an empty value falls back to the address in the key path.
    pub fn from_key_value(kv: &KeyValue) -> Result<(EntryKey, Self), Error> {
        let key = EntryKey::parse(&kv.key).ok_or_else(|| Error::InvalidKey(kv.key.clone()))?;
        let addr = if kv.value.is_empty() {
            key.address.clone()
        } else {
            kv.value.clone()
        };
        let address = Address {
            addr,
            weight: key.weight().to_string(),
            lease: kv.lease,
        };
        Ok((key, address))
    }

    /// Weights must lie in `1..=MAX_WEIGHT`.
    pub fn parse_weight(&self) -> Result<i64, Error> {
        let weight = self.weight.trim();
        if weight.is_empty() {
            return Ok(DEFAULT_WEIGHT);
        }
        match weight.parse::<i64>() {
            Ok(w) if w > 0 && w <= MAX_WEIGHT => Ok(w),
            _ => Err(Error::MalformedWeight {
                addr: self.addr.clone(),
                weight: self.weight.clone(),
            }),
        }
    }
}
