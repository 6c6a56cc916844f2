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

//! Smooth weighted round-robin.
//!
//! Every pick raises each entry's credit by its weight, hands the call to the
//! entry with the most credit and charges it the total weight. Over any
//! window of `total` consecutive picks each entry is chosen exactly `weight`
//! times, and heavy entries are interleaved with light ones instead of being
//! picked in bursts.

use std::sync::{Arc, Mutex, PoisonError};

use srad_base::constants::SMOOTH_WEIGHTED_ROUND_ROBIN;

use crate::{
    address::Address,
    error::Error,
    loadbalance::types::{ArcPicker, ErrPicker, Metadata, PickFailure, Picker, PickerBuilder},
};

#[derive(Debug)]
struct Entry {
    address: Address,
    weight: i64,
    current: i64,
}

#[derive(Debug)]
pub struct SmoothWeightedPicker {
    entries: Mutex<Vec<Entry>>,
    total: i64,
}

impl SmoothWeightedPicker {
    pub fn new(addresses: &[Address]) -> Result<Self, Error> {
        if addresses.is_empty() {
            return Err(Error::NoAddressesAvailable);
        }
        let mut entries = Vec::with_capacity(addresses.len());
        let mut total = 0;
        for address in addresses {
            let weight = address.parse_weight()?;
            total = i64::checked_add(total, weight).ok_or_else(|| Error::MalformedWeight {
                addr: address.addr.clone(),
                weight: address.weight.clone(),
            })?;
            entries.push(Entry {
                address: address.clone(),
                weight,
                current: weight,
            });
        }
        Ok(SmoothWeightedPicker {
            entries: Mutex::new(entries),
            total,
        })
    }
}

impl Picker for SmoothWeightedPicker {
    fn pick(&self) -> Result<Address, Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut selected: Option<usize> = None;
        for i in 0..entries.len() {
            entries[i].current += entries[i].weight;
            // ties go to the earlier entry
            match selected {
                Some(s) if entries[s].current >= entries[i].current => {}
                _ => selected = Some(i),
            }
        }
        let selected = selected.ok_or(Error::NoAddressesAvailable)?;
        entries[selected].current -= self.total;
        Ok(entries[selected].address.clone())
    }
}

#[derive(Debug)]
pub struct SmoothWeightedPickerBuilder {
    pub metadata: Metadata,
}

impl Default for SmoothWeightedPickerBuilder {
    fn default() -> Self {
        SmoothWeightedPickerBuilder {
            metadata: Metadata::new(SMOOTH_WEIGHTED_ROUND_ROBIN),
        }
    }
}

impl PickerBuilder for SmoothWeightedPickerBuilder {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn build(&self, addresses: &[Address]) -> ArcPicker {
        match SmoothWeightedPicker::new(addresses) {
            Ok(picker) => Arc::new(picker),
            Err(Error::MalformedWeight { addr, weight }) => Arc::new(ErrPicker::new(
                PickFailure::MalformedWeight { addr, weight },
            )),
            Err(_) => Arc::new(ErrPicker::new(PickFailure::NoAddresses)),
        }
    }
}
