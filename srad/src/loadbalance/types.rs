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

use std::{fmt::Debug, sync::Arc};

use crate::{address::Address, error::Error};

pub type ArcPicker = Arc<dyn Picker + Send + Sync>;

pub type BoxPickerBuilder = Box<dyn PickerBuilder + Send + Sync>;

/// Selects one address per call. Implementations are immutable snapshots of
/// an address set; a new set means a new picker.
pub trait Picker: Debug {
    fn pick(&self) -> Result<Address, Error>;
}

pub trait PickerBuilder: Debug {
    fn metadata(&self) -> &Metadata;

    fn build(&self, addresses: &[Address]) -> ArcPicker;
}

#[derive(Debug)]
pub struct Metadata {
    pub name: &'static str,
}

impl Metadata {
    pub fn new(name: &'static str) -> Self {
        Metadata { name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickFailure {
    NoAddresses,
    MalformedWeight { addr: String, weight: String },
}

impl From<&PickFailure> for Error {
    fn from(failure: &PickFailure) -> Self {
        match failure {
            PickFailure::NoAddresses => Error::NoAddressesAvailable,
            PickFailure::MalformedWeight { addr, weight } => Error::MalformedWeight {
                addr: addr.clone(),
                weight: weight.clone(),
            },
        }
    }
}

/// Fails every pick with the same error.
#[derive(Debug)]
pub struct ErrPicker {
    failure: PickFailure,
}

impl ErrPicker {
    pub fn new(failure: PickFailure) -> Self {
        ErrPicker { failure }
    }

    pub fn failure(&self) -> &PickFailure {
        &self.failure
    }
}

impl Picker for ErrPicker {
    fn pick(&self) -> Result<Address, Error> {
        Err((&self.failure).into())
    }
}
