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

pub mod address;
pub mod channel;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod loadbalance;
pub mod pool;
pub mod registry;
pub mod resolver;

pub use address::Address;
pub use channel::{Channel, ConnectivityState};
pub use directory::{
    memory::MemoryDirectory, BoxDirectoryConnector, ConnectOptions, DirectoryClient,
    DirectoryConnector,
};
pub use discovery::{ConsumerOptions, Discovery};
pub use error::Error;
pub use loadbalance::{get_picker_builder, Picker, PickerBuilder};
pub use pool::{Connection, ConnectionPool};
pub use registry::{register, RegisterOptions, Registration};
pub use resolver::{AddressListener, AddressSet, Resolver};

pub use srad_base::{EntryKey, ServiceKey};
pub use srad_logger as logger;

pub type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;
