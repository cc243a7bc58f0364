// This file is part of Astarte.
//
// Copyright 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Discovered devices that can be onboarded.

use std::net::{IpAddr, SocketAddr};

use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{DeviceId, Doxm, Error};
use tracing::error;
use url::{Host, Url};

/// Network address of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Address of the device
    pub addr: IpAddr,
    /// Port for the plain requests
    pub port: u16,
    /// Port for the secure session
    pub secure_port: u16,
}

impl Endpoint {
    /// Creates the endpoint.
    pub fn new(addr: IpAddr, port: u16, secure_port: u16) -> Self {
        Self {
            addr,
            port,
            secure_port,
        }
    }

    /// Peer address of the secure session.
    pub fn secure_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.secure_port)
    }

    /// Returns the `coaps` URI of a resource hosted by the device.
    pub fn secure_uri(&self, path: &str) -> Result<Url, Error> {
        let host: Host<String> = match self.addr {
            IpAddr::V4(ipv4_addr) => Host::Ipv4(ipv4_addr),
            IpAddr::V6(ipv6_addr) => Host::Ipv6(ipv6_addr),
        };

        Url::parse(&format!("coaps://{host}:{}{path}", self.secure_port)).map_err(|err| {
            error!(error = %err, %host, path, "couldn't parse url");

            Error::new(ErrorKind::Invalid, "secure resource uri")
        })
    }
}

/// A device candidate for the ownership transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Where to reach the device.
    pub endpoint: Endpoint,
    /// Ownership metadata of the device.
    pub doxm: Doxm,
}

impl DeviceRecord {
    /// Creates the record.
    pub fn new(endpoint: Endpoint, doxm: Doxm) -> Self {
        Self { endpoint, doxm }
    }

    /// Identifier of the device.
    pub fn device_id(&self) -> DeviceId {
        self.doxm.device_id
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn secure_uri_v4() {
        let endpoint = Endpoint::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 12)), 5683, 5684);

        let uri = endpoint.secure_uri("/oic/sec/doxm").unwrap();

        insta::assert_snapshot!(uri, @"coaps://192.168.1.12:5684/oic/sec/doxm");
    }

    #[test]
    fn secure_uri_v6() {
        let addr = IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1));
        let endpoint = Endpoint::new(addr, 5683, 49152);

        let uri = endpoint.secure_uri("/oic/sec/cred").unwrap();

        insta::assert_snapshot!(uri, @"coaps://[fe80::1]:49152/oic/sec/cred");
    }

    #[test]
    fn secure_addr_port() {
        let endpoint = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5683, 5684);

        assert_eq!(endpoint.secure_addr().port(), 5684);
    }
}
