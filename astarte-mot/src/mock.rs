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

//! Collaborators recording the calls of the manager.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{DeviceId, Doxm, Error, Oxm};
use zeroize::Zeroizing;

use crate::client::{Request, RequestId, Transport};
use crate::device::{DeviceRecord, Endpoint};
use crate::session::{CipherSuite, KeyProvider, OWNER_PSK_LEN, SecureSession};
use crate::storage::MemoryStore;
use crate::{MotConfig, MotManager, ProvisionResult};

pub(crate) type TestManager = MotManager<MockTransport, MockSession, MemoryStore, u32>;

#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    sent: Vec<(RequestId, Request)>,
    next: u64,
    pub(crate) fail: bool,
}

impl MockTransport {
    pub(crate) fn sent(&self) -> &[(RequestId, Request)] {
        &self.sent
    }
}

impl Transport for MockTransport {
    async fn send(&mut self, request: Request) -> Result<RequestId, Error> {
        if self.fail {
            return Err(Error::new(ErrorKind::Io, "mock transport"));
        }

        self.next += 1;
        let id = RequestId::new(self.next);

        self.sent.push((id, request));

        Ok(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Observer,
    KeyProvider(KeyProvider),
    CipherSuite(CipherSuite),
    Handshake(SocketAddr),
    Close(SocketAddr),
    DerivePsk(Vec<u8>),
}

#[derive(Debug, Default)]
pub(crate) struct MockSession {
    calls: Vec<Call>,
    pub(crate) fail_close: bool,
    pub(crate) fail_handshake: bool,
}

impl MockSession {
    pub(crate) fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub(crate) fn handshakes(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Handshake(_)))
            .count()
    }
}

impl SecureSession for MockSession {
    async fn register_handshake_observer(&mut self) -> Result<(), Error> {
        self.calls.push(Call::Observer);

        Ok(())
    }

    async fn register_key_provider(&mut self, provider: KeyProvider) -> Result<(), Error> {
        self.calls.push(Call::KeyProvider(provider));

        Ok(())
    }

    async fn select_cipher_suite(&mut self, suite: CipherSuite) -> Result<(), Error> {
        self.calls.push(Call::CipherSuite(suite));

        Ok(())
    }

    async fn initiate_handshake(&mut self, peer: SocketAddr) -> Result<(), Error> {
        if self.fail_handshake {
            return Err(Error::new(ErrorKind::Network, "mock handshake"));
        }

        self.calls.push(Call::Handshake(peer));

        Ok(())
    }

    async fn close_session(&mut self, peer: SocketAddr) -> Result<(), Error> {
        if self.fail_close {
            return Err(Error::new(ErrorKind::Network, "mock close"));
        }

        self.calls.push(Call::Close(peer));

        Ok(())
    }

    async fn derive_psk(
        &mut self,
        _peer: SocketAddr,
        label: &[u8],
        _owner: &DeviceId,
        _device: &DeviceId,
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        self.calls.push(Call::DerivePsk(label.to_vec()));

        Ok(Zeroizing::new(vec![0x11; OWNER_PSK_LEN]))
    }
}

pub(crate) fn owner() -> DeviceId {
    DeviceId::new([0xaa; 16])
}

pub(crate) fn device(n: u8, oxm: Oxm) -> DeviceRecord {
    DeviceRecord::new(
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), 5683, 5684),
        Doxm::new(
            DeviceId::new([n; 16]),
            vec![Oxm::JustWorks, Oxm::RandomDevicePin, Oxm::PreconfigPin],
            oxm,
        ),
    )
}

/// Manager with a PIN prompt counting the calls.
pub(crate) fn manager(store: MemoryStore) -> (TestManager, Arc<AtomicUsize>) {
    let prompts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&prompts);

    let pin_input = move |_: &DeviceId| -> Result<Zeroizing<Vec<u8>>, Error> {
        counter.fetch_add(1, Ordering::SeqCst);

        Ok(Zeroizing::new(b"12345678".to_vec()))
    };

    let manager = MotManager::new(
        MotConfig::new(owner()),
        MockTransport::default(),
        MockSession::default(),
        store,
        pin_input,
    );

    (manager, prompts)
}

pub(crate) type Collected = Arc<Mutex<Vec<ProvisionResult<u32>>>>;

/// Callback storing the results.
pub(crate) fn collect() -> (Collected, impl FnOnce(ProvisionResult<u32>) + Send + 'static) {
    let results = Collected::default();
    let cloned = Arc::clone(&results);

    let callback = move |res: ProvisionResult<u32>| {
        cloned.lock().unwrap().push(res);
    };

    (results, callback)
}
