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

//! Loopback network of simulated devices.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

use astarte_mot::astarte_mot_protocol::error::ErrorKind;
use astarte_mot::astarte_mot_protocol::{Cred, DeviceId, Doxm, Error, Oxm, Resource, ResultCode};
use astarte_mot::client::{Request, RequestId, Transport};
use astarte_mot::event::{Event, EventSender};
use astarte_mot::oxm::RANDOM_PIN_SIZE;
use astarte_mot::session::{
    CipherSuite, HandshakeResult, KeyProvider, OWNER_PSK_LEN, SecureSession,
};
use astarte_mot::{DeviceRecord, Endpoint};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const BASE_PORT: u16 = 5683;

#[derive(Debug)]
struct SimDevice {
    endpoint: Endpoint,
    doxm: Doxm,
    display_pin: Zeroizing<Vec<u8>>,
    preconfigured_pin: Option<Zeroizing<Vec<u8>>>,
    session: bool,
    sub_owner_psk: Option<Zeroizing<Vec<u8>>>,
}

impl SimDevice {
    fn expected_pin(&self) -> Option<&[u8]> {
        match self.doxm.oxm_sel {
            Oxm::RandomDevicePin => Some(self.display_pin.as_slice()),
            Oxm::PreconfigPin => self.preconfigured_pin.as_deref().map(Vec::as_slice),
            Oxm::JustWorks | Oxm::ManufacturerCert => None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    devices: Vec<SimDevice>,
    key_provider: KeyProvider,
    suite: Option<CipherSuite>,
    next_id: u64,
}

/// Simulated devices shared by the transport and the secure session.
#[derive(Debug, Clone)]
pub struct Network {
    inner: Arc<Mutex<Inner>>,
    events: EventSender,
}

impl Network {
    /// Creates `count` owned devices supporting the given methods.
    pub fn new(count: u8, oxms: &[Oxm], events: EventSender) -> Self {
        let devices = (0..u16::from(count))
            .map(|n| {
                let port = BASE_PORT + n * 2;
                let endpoint = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port, port + 1);
                let doxm = Doxm::new(
                    DeviceId::new(rand::random()),
                    oxms.to_vec(),
                    Oxm::JustWorks,
                );
                let display_pin = (0..RANDOM_PIN_SIZE)
                    .map(|_| rand::random_range(b'0'..=b'9'))
                    .collect();

                SimDevice {
                    endpoint,
                    doxm,
                    display_pin: Zeroizing::new(display_pin),
                    preconfigured_pin: None,
                    session: false,
                    sub_owner_psk: None,
                }
            })
            .collect();

        Self {
            inner: Arc::new(Mutex::new(Inner {
                devices,
                key_provider: KeyProvider::Default,
                suite: None,
                next_id: 0,
            })),
            events,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, Error> {
        self.inner
            .lock()
            .map_err(|_| Error::new(ErrorKind::Io, "simulated network lock"))
    }

    /// Discovers the devices with their current ownership document.
    pub fn discover(&self) -> Result<Vec<DeviceRecord>, Error> {
        let inner = self.lock()?;

        Ok(inner
            .devices
            .iter()
            .map(|device| DeviceRecord::new(device.endpoint, device.doxm.clone()))
            .collect())
    }

    /// Reads the PIN on the display of the device.
    pub fn display_pin(&self, device_id: &DeviceId) -> Result<Zeroizing<Vec<u8>>, Error> {
        let inner = self.lock()?;

        inner
            .devices
            .iter()
            .find(|device| device.doxm.device_id == *device_id)
            .map(|device| device.display_pin.clone())
            .ok_or(Error::new(ErrorKind::NotFound, "simulated device"))
    }

    /// Sub owners registered on each device.
    pub fn sub_owners(&self) -> Result<Vec<(DeviceId, Vec<DeviceId>)>, Error> {
        let inner = self.lock()?;

        Ok(inner
            .devices
            .iter()
            .map(|device| (device.doxm.device_id, device.doxm.sub_owners.clone()))
            .collect())
    }

    fn handle(&self, request: &Request) -> Result<(RequestId, ResultCode), Error> {
        let addr = request
            .uri
            .socket_addrs(|| None)
            .ok()
            .and_then(|addrs| addrs.first().copied())
            .ok_or(Error::new(ErrorKind::Network, "request address"))?;

        let mut inner = self.lock()?;

        inner.next_id += 1;
        let id = RequestId::new(inner.next_id);

        let device = inner
            .devices
            .iter_mut()
            .find(|device| device.endpoint.secure_addr() == addr)
            .ok_or(Error::new(ErrorKind::Network, "unreachable device"))?;

        let status = match request.uri.path() {
            path if path == Doxm::URI => {
                let doxm = Doxm::decode(&request.payload)?;

                debug!(device = %device.doxm.device_id, oxm_sel = %doxm.oxm_sel, "doxm updated");

                device.doxm.oxms = doxm.oxms;
                device.doxm.oxm_sel = doxm.oxm_sel;
                device.doxm.mom = doxm.mom;

                ResultCode::ResourceChanged
            }
            path if path == Cred::URI => {
                let cred = Cred::decode(&request.payload)?;

                if cred.is_pin() {
                    device.preconfigured_pin =
                        Some(Zeroizing::new(cred.private_data.data().to_vec()));

                    ResultCode::ResourceChanged
                } else if device.session && device.sub_owner_psk.is_some() {
                    info!(
                        device = %device.doxm.device_id,
                        sub_owner = %cred.subject,
                        "sub owner registered"
                    );

                    device.doxm.sub_owners.push(cred.subject);

                    ResultCode::ResourceChanged
                } else {
                    warn!(device = %device.doxm.device_id, "credential without a secure session");

                    ResultCode::Unauthorized
                }
            }
            path => {
                warn!(path, "unknown resource");

                ResultCode::NoResource
            }
        };

        Ok((id, status))
    }

    fn handshake(&self, peer: SocketAddr) -> Result<HandshakeResult, Error> {
        let mut inner = self.lock()?;
        let inner = &mut *inner;

        let Some(device) = inner
            .devices
            .iter_mut()
            .find(|device| device.endpoint.secure_addr() == peer)
        else {
            return Ok(HandshakeResult::Error);
        };

        let authenticated = match &inner.key_provider {
            KeyProvider::Pin { device_id, pin, .. } => {
                *device_id == device.doxm.device_id
                    && device.expected_pin() == Some(pin.as_slice())
            }
            KeyProvider::Default => false,
        };

        debug!(%peer, suite = ?inner.suite, authenticated, "handshake");

        if !authenticated {
            return Ok(HandshakeResult::AuthenticationFailure);
        }

        device.session = true;

        Ok(HandshakeResult::Success)
    }
}

/// Transport delivering the requests to the simulated devices.
#[derive(Debug, Clone)]
pub struct SimTransport(pub Network);

impl Transport for SimTransport {
    async fn send(&mut self, request: Request) -> Result<RequestId, Error> {
        let (id, status) = self.0.handle(&request)?;

        self.0.events.send(Event::Response {
            id,
            status: Some(status),
        })?;

        Ok(id)
    }
}

/// Secure session with the simulated devices.
#[derive(Debug, Clone)]
pub struct SimSession(pub Network);

impl SecureSession for SimSession {
    async fn register_handshake_observer(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn register_key_provider(&mut self, provider: KeyProvider) -> Result<(), Error> {
        self.0.lock()?.key_provider = provider;

        Ok(())
    }

    async fn select_cipher_suite(&mut self, suite: CipherSuite) -> Result<(), Error> {
        self.0.lock()?.suite = Some(suite);

        Ok(())
    }

    async fn initiate_handshake(&mut self, peer: SocketAddr) -> Result<(), Error> {
        let result = self.0.handshake(peer)?;

        self.0.events.send(Event::Handshake { peer, result })
    }

    async fn close_session(&mut self, peer: SocketAddr) -> Result<(), Error> {
        let mut inner = self.0.lock()?;

        if let Some(device) = inner
            .devices
            .iter_mut()
            .find(|device| device.endpoint.secure_addr() == peer)
        {
            device.session = false;
        }

        Ok(())
    }

    async fn derive_psk(
        &mut self,
        peer: SocketAddr,
        _label: &[u8],
        _owner: &DeviceId,
        _device: &DeviceId,
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let mut inner = self.0.lock()?;

        let device = inner
            .devices
            .iter_mut()
            .find(|device| device.endpoint.secure_addr() == peer && device.session)
            .ok_or(Error::new(ErrorKind::Authentication, "no secure session"))?;

        // random key stored on both ends
        let psk = Zeroizing::new(rand::random::<[u8; OWNER_PSK_LEN]>().to_vec());
        device.sub_owner_psk = Some(psk.clone());

        Ok(psk)
    }
}
