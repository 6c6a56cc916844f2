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

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

use crate::constants::WEIGHT_KEY;

/// Identifies one logical service inside the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub scheme: String,
    pub service: String,
}

impl ServiceKey {
    pub fn new(scheme: impl Into<String>, service: impl Into<String>) -> Self {
        ServiceKey {
            scheme: scheme.into(),
            service: service.into(),
        }
    }

    // prefix shared by every entry of the service: scheme:///service/
    pub fn prefix(&self) -> String {
        format!("{}:///{}/", self.scheme, self.service)
    }

    // entry key: scheme:///service/host:port?weight=W
    pub fn entry_key(&self, address: &str, weight: i64) -> String {
        format!("{}{}?{}={}", self.prefix(), address, WEIGHT_KEY, weight)
    }
}

impl Display for ServiceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scheme, self.service)
    }
}

/// A parsed directory key of the form `scheme:///service/host:port?k=v`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryKey {
    pub scheme: String,
    pub service: String,
    pub address: String,
    pub params: HashMap<String, String>,
}

impl EntryKey {
    pub fn parse(key: &str) -> Option<Self> {
        let (scheme, rest) = key.split_once("://")?;
        // the authority is always empty
        let rest = rest.strip_prefix('/')?;
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        let (service, address) = path.rsplit_once('/')?;
        if scheme.is_empty() || service.is_empty() || address.is_empty() {
            return None;
        }

        Some(EntryKey {
            scheme: scheme.to_string(),
            service: service.to_string(),
            address: address.to_string(),
            params: query.map(EntryKey::decode).unwrap_or_default(),
        })
    }

    pub fn service_key(&self) -> ServiceKey {
        ServiceKey::new(self.scheme.as_str(), self.service.as_str())
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Raw weight parameter, empty when the key carries none.
    pub fn weight(&self) -> &str {
        self.get_param(WEIGHT_KEY).unwrap_or_default()
    }

    fn decode(raw_query_string: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        for pair in raw_query_string.split('&') {
            let Some((k, v)) = pair.split_once('=') else {
                continue;
            };
            let v = urlencoding::decode(v.trim())
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| v.trim().to_string());
            params.insert(k.trim().to_string(), v);
        }
        params
    }
}

impl Display for EntryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:///{}/{}", self.scheme, self.service, self.address)?;
        let mut params: Vec<_> = self.params.iter().collect();
        params.sort();
        for (i, (k, v)) in params.into_iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, k, urlencoding::encode(v))?;
        }
        Ok(())
    }
}

/// Joins host and port into `host:port`, bracketing IPv6 hosts.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
