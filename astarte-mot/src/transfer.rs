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

//! Multiple ownership transfer of a single device.
//!
//! A device goes through:
//!
//! 1. method validation,
//! 2. secret loading (operator prompt or pre-configured PIN),
//! 3. secure session handshake, completed by an [`Event::Handshake`](crate::Event::Handshake),
//! 4. derivation of the sub-owner PSK and POST of the sub-owner credential, completed by an
//!    [`Event::Response`](crate::Event::Response),
//! 5. commit to the provisioning history.
//!
//! The devices of a batch are transferred one at a time, in order.

use std::net::SocketAddr;

use astarte_mot_protocol::cred::{Encoding, PrivateData};
use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{Cred, DeviceId, Error, Oxm, ResultCode, ResultEntry};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::client::{Pending, Request, RequestId, Transport};
use crate::device::DeviceRecord;
use crate::oxm::{LoadSecret, check_pin};
use crate::session::{CipherSuite, HandshakeResult, KeyProvider, OWNER_PSK_LEN, SecureSession};
use crate::storage::{CredentialStore, HistoryStore};
use crate::{MotManager, ProvisionResult, ResultCallback};

/// Maximum number of handshakes with a wrong random PIN.
pub const WRONG_PIN_MAX_ATTEMPT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Idle,
    MethodSelected,
    SecretLoaded,
    SessionPending,
    SessionEstablished,
    CredentialPosted(RequestId),
    Resolved(ResultCode),
}

/// Input of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Start,
    SecretLoaded,
    SessionInitiated,
    Handshake(HandshakeResult),
    CredentialPosted(RequestId),
    CredentialResponse(RequestId, Option<ResultCode>),
    Committed(ResultCode),
    Failed(ResultCode),
}

/// Operation the manager performs for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    LoadSecret,
    CreateSession,
    ProvisionSubOwner,
    Commit,
    Restart,
    Resolve(ResultCode),
    Wait,
}

/// Transfer state of the selected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceTransfer {
    index: usize,
    oxm: Oxm,
    state: State,
    attempts: u8,
    established: bool,
}

impl DeviceTransfer {
    pub(crate) fn new(index: usize, oxm: Oxm) -> Self {
        Self {
            index,
            oxm,
            state: State::Idle,
            attempts: 0,
            established: false,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn attempts(&self) -> u8 {
        self.attempts
    }

    /// The secure session with the device completed the handshake.
    pub(crate) fn is_established(&self) -> bool {
        self.established
    }

    fn resolve(&mut self, code: ResultCode) -> Action {
        // a pending code would never complete the batch
        let code = if code.is_pending() {
            ResultCode::Error
        } else {
            code
        };

        self.state = State::Resolved(code);

        Action::Resolve(code)
    }

    pub(crate) fn transition(&mut self, step: Step) -> Action {
        match (self.state, step) {
            (State::Resolved(_), _) => {
                debug!(?step, "transfer already resolved");

                Action::Wait
            }
            (State::Idle, Step::Start) => {
                if !self.oxm.is_pin_based() {
                    error!(oxm = %self.oxm, "unsupported method");

                    return self.resolve(ResultCode::InvalidParam);
                }

                self.state = State::MethodSelected;

                Action::LoadSecret
            }
            (State::MethodSelected, Step::SecretLoaded) => {
                self.state = State::SecretLoaded;

                Action::CreateSession
            }
            (State::SecretLoaded, Step::SessionInitiated) => {
                self.state = State::SessionPending;

                Action::Wait
            }
            (State::SessionPending, Step::Handshake(HandshakeResult::Success)) => {
                self.state = State::SessionEstablished;
                self.established = true;

                Action::ProvisionSubOwner
            }
            (State::SessionPending, Step::Handshake(HandshakeResult::AuthenticationFailure))
                if self.oxm == Oxm::RandomDevicePin =>
            {
                self.attempts = self.attempts.saturating_add(1);

                if self.attempts < WRONG_PIN_MAX_ATTEMPT {
                    warn!(attempts = self.attempts, "the PIN may be wrong, restarting");

                    self.state = State::Idle;

                    return Action::Restart;
                }

                error!(
                    attempts = self.attempts,
                    "exceeded the number of authentication attempts"
                );

                self.resolve(ResultCode::AuthenticationFailure)
            }
            (State::SessionPending, Step::Handshake(HandshakeResult::AuthenticationFailure)) => {
                error!("couldn't authenticate the secure session");

                self.resolve(ResultCode::AuthenticationFailure)
            }
            (State::SessionPending, Step::Handshake(HandshakeResult::Error)) => {
                error!("couldn't establish the secure session");

                self.resolve(ResultCode::CommunicationError)
            }
            (State::SessionEstablished, Step::CredentialPosted(id)) => {
                self.state = State::CredentialPosted(id);

                Action::Wait
            }
            (State::CredentialPosted(exp), Step::CredentialResponse(id, status)) if exp == id => {
                match status {
                    Some(ResultCode::ResourceChanged) => Action::Commit,
                    Some(code) => {
                        error!(%code, "unexpected result for the sub-owner credential");

                        self.resolve(code)
                    }
                    None => {
                        error!("missing response for the sub-owner credential");

                        self.resolve(ResultCode::Error)
                    }
                }
            }
            (State::CredentialPosted(_), Step::Committed(code)) => self.resolve(code),
            (_, Step::Failed(code)) => self.resolve(code),
            (state, step) => {
                warn!(?state, ?step, "unexpected step, ignoring");

                Action::Wait
            }
        }
    }
}

/// Single slot for the transfer waiting on a handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct InFlight(Option<SocketAddr>);

impl InFlight {
    pub(crate) fn set(&mut self, peer: SocketAddr) {
        self.0 = Some(peer);
    }

    pub(crate) fn clear(&mut self) {
        self.0 = None;
    }

    pub(crate) fn matches(&self, peer: SocketAddr) -> bool {
        self.0 == Some(peer)
    }
}

/// Context of a batch of devices.
pub(crate) struct TransferContext<U> {
    ctx: U,
    devices: Vec<DeviceRecord>,
    results: Vec<ResultEntry>,
    callback: ResultCallback<U>,
    has_error: bool,
    current: DeviceTransfer,
}

impl<U> TransferContext<U> {
    pub(crate) fn new(
        ctx: U,
        devices: Vec<DeviceRecord>,
        callback: ResultCallback<U>,
    ) -> Result<Self, Error> {
        let first = devices
            .first()
            .ok_or(Error::new(ErrorKind::Invalid, "empty device list"))?;

        let current = DeviceTransfer::new(0, first.doxm.oxm_sel);
        let results = devices
            .iter()
            .map(|device| ResultEntry::pending(device.device_id()))
            .collect();

        Ok(Self {
            ctx,
            devices,
            results,
            callback,
            has_error: false,
            current,
        })
    }

    pub(crate) fn selected(&self) -> &DeviceRecord {
        &self.devices[self.current.index]
    }

    pub(crate) fn results(&self) -> &[ResultEntry] {
        &self.results
    }

    fn record(&mut self, device_id: DeviceId, code: ResultCode) {
        for entry in self
            .results
            .iter_mut()
            .filter(|entry| entry.device_id == device_id)
        {
            entry.result = code;
        }

        if !code.is_ok() {
            self.has_error = true;
        }
    }

    fn is_complete(&self) -> bool {
        self.results.iter().all(ResultEntry::is_resolved)
    }

    /// Selects the next device still pending.
    fn advance(&mut self) -> bool {
        let next = (self.current.index + 1..self.devices.len())
            .find(|idx| self.results[*idx].result.is_pending());

        let Some(index) = next else {
            return false;
        };

        self.current = DeviceTransfer::new(index, self.devices[index].doxm.oxm_sel);

        true
    }

    fn finish(self) {
        (self.callback)(ProvisionResult {
            ctx: self.ctx,
            results: self.results,
            has_error: self.has_error,
        });
    }
}

impl<T, S, D, U> MotManager<T, S, D, U>
where
    T: Transport,
    S: SecureSession,
    D: HistoryStore + CredentialStore,
{
    /// Runs the state machine until it waits for an event.
    pub(crate) async fn drive(&mut self, mut step: Step) {
        loop {
            let Some(batch) = self.batch.as_mut() else {
                debug!(?step, "no transfer in progress");

                return;
            };

            let action = batch.current.transition(step);

            debug!(state = ?batch.current.state(), ?action, "transfer step");

            step = match action {
                Action::Wait => return,
                Action::LoadSecret => match self.load_secret().await {
                    Ok(()) => Step::SecretLoaded,
                    Err(err) => Step::Failed(err.code()),
                },
                Action::CreateSession => match self.create_session().await {
                    Ok(()) => Step::SessionInitiated,
                    Err(err) => Step::Failed(err.code()),
                },
                Action::ProvisionSubOwner => match self.provision_sub_owner().await {
                    Ok(id) => Step::CredentialPosted(id),
                    Err(err) => Step::Failed(err.code()),
                },
                Action::Commit => Step::Committed(self.commit().await),
                Action::Restart => Step::Start,
                Action::Resolve(code) => {
                    if !self.resolve(code).await {
                        return;
                    }

                    Step::Start
                }
            };
        }
    }

    pub(crate) async fn on_handshake(&mut self, peer: SocketAddr, result: HandshakeResult) {
        if !self.in_flight.matches(peer) {
            debug!(%peer, ?result, "handshake of another peer, ignoring");

            return;
        }

        info!(%peer, ?result, "received handshake result");

        self.drive(Step::Handshake(result)).await;
    }

    pub(crate) async fn on_response(&mut self, id: RequestId, status: Option<ResultCode>) {
        match self.pending.remove(&id) {
            Some(Pending::Short(request)) => request.complete(status),
            Some(Pending::SubOwnerCredential) => {
                self.drive(Step::CredentialResponse(id, status)).await;
            }
            None => {
                warn!(%id, "response for an unknown request");
            }
        }
    }

    fn selected(&self) -> Result<&DeviceRecord, Error> {
        self.batch
            .as_ref()
            .map(TransferContext::selected)
            .ok_or(Error::new(ErrorKind::NotFound, "transfer in progress"))
    }

    async fn load_secret(&mut self) -> Result<(), Error> {
        let device = self.selected()?;
        let device_id = device.device_id();
        let oxm = device.doxm.oxm_sel;

        info!(device = %device_id, %oxm, "starting multiple ownership transfer");

        if let Err(err) = self.session.register_handshake_observer().await {
            warn!(error = %err, "couldn't register handshake observer");
        }

        let method = self.registry.mot_method(oxm)?;

        let pin = match method.load_secret {
            LoadSecret::Nothing => return Ok(()),
            LoadSecret::PromptPin => self.pin_input.read_pin(&device_id).inspect_err(|err| {
                error!(error = %err, device = %device_id, "couldn't read PIN");
            })?,
            LoadSecret::PreconfiguredPin => self.preconfigured_pin(&device_id).await?,
        };

        check_pin(&pin)?;

        self.session
            .register_key_provider(KeyProvider::Pin {
                oxm,
                device_id,
                pin,
            })
            .await
            .inspect_err(|err| {
                error!(error = %err, "couldn't register PIN key provider");
            })
    }

    /// Looks up the PIN for the device, falling back to the wildcard subject.
    async fn preconfigured_pin(&self, device_id: &DeviceId) -> Result<Zeroizing<Vec<u8>>, Error> {
        for subject in [device_id, &DeviceId::WILDCARD] {
            let cred = self.store.find_credential(subject).await?;

            if let Some(cred) = cred.filter(Cred::is_pin) {
                debug!(%subject, "found pre-configured PIN");

                return Ok(Zeroizing::new(cred.private_data.data().to_vec()));
            }
        }

        error!(device = %device_id, "missing pre-configured PIN");

        Err(Error::new(ErrorKind::NotFound, "pre-configured PIN"))
    }

    async fn create_session(&mut self) -> Result<(), Error> {
        let device = self.selected()?;
        let peer = device.endpoint.secure_addr();
        let method = self.registry.mot_method(device.doxm.oxm_sel)?;

        self.in_flight.set(peer);

        let suite = method.create_session.cipher_suite();
        self.session
            .select_cipher_suite(suite)
            .await
            .inspect_err(|err| {
                error!(error = %err, %suite, "couldn't select cipher suite");
            })?;

        debug!(%peer, "initiating handshake");

        self.session
            .initiate_handshake(peer)
            .await
            .inspect_err(|err| {
                error!(error = %err, %peer, "couldn't initiate handshake");
            })
    }

    async fn provision_sub_owner(&mut self) -> Result<RequestId, Error> {
        let device = self.selected()?.clone();
        let device_id = device.device_id();
        let owner = self.config.owner_id;
        let peer = device.endpoint.secure_addr();

        // previous credentials like the pre-configured PIN
        match self.store.remove_credential(&device_id).await {
            Ok(true) => debug!(device = %device_id, "removed previous credential"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "couldn't remove previous credential"),
        }

        let psk = self
            .session
            .derive_psk(peer, device.doxm.oxm_sel.urn().as_bytes(), &owner, &device_id)
            .await
            .inspect_err(|err| {
                error!(error = %err, "couldn't derive the sub-owner PSK");
            })?;

        if psk.len() != OWNER_PSK_LEN {
            error!(len = psk.len(), "invalid sub-owner PSK length");

            return Err(Error::new(ErrorKind::Invalid, "sub-owner PSK length"));
        }

        let encoded = Zeroizing::new(BASE64_STANDARD.encode(psk.as_slice()));
        let key = PrivateData::new(encoded.as_bytes().to_vec(), Encoding::Base64);

        self.store
            .add_credential(Cred::symmetric(device_id, key, owner))
            .await
            .inspect_err(|err| {
                error!(error = %err, "couldn't store the sub-owner PSK");
            })?;

        let mut cred = self.store.find_credential(&device_id).await?.ok_or_else(|| {
            error!(device = %device_id, "couldn't find the sub-owner PSK");

            Error::new(ErrorKind::NotFound, "sub-owner PSK")
        })?;

        cred.subject = owner;
        cred.eowner_id = Some(owner);
        cred.private_data = PrivateData::empty(cred.private_data.encoding());

        let request = Request::post(&device, &cred)?;

        self.send(request, Pending::SubOwnerCredential).await
    }

    async fn commit(&mut self) -> ResultCode {
        let (peer, device_id) = match self.selected() {
            Ok(device) => (device.endpoint.secure_addr(), device.device_id()),
            Err(err) => return err.code(),
        };

        // verify the owner credential on the next session
        if let Err(err) = self.session.close_session(peer).await {
            error!(error = %err, %peer, "couldn't close the secure session");

            return ResultCode::Error;
        }

        let suite = CipherSuite::ECDHE_PSK_AES_128_CBC_SHA256;
        if let Err(err) = self.session.select_cipher_suite(suite).await {
            error!(error = %err, %suite, "couldn't select cipher suite");

            return ResultCode::Error;
        }

        match self.store.add_device(&device_id).await {
            Ok(()) => info!(device = %device_id, "device added to the provisioning history"),
            Err(err) => error!(
                error = %err,
                device = %device_id,
                "transfer completed but couldn't add the device to the provisioning history"
            ),
        }

        ResultCode::Ok
    }

    /// Records the result, returns true if the next device must be started.
    async fn resolve(&mut self, code: ResultCode) -> bool {
        let Some(batch) = self.batch.as_mut() else {
            return false;
        };

        let device = batch.selected();
        let device_id = device.device_id();
        let peer = device.endpoint.secure_addr();
        let oxm = device.doxm.oxm_sel;

        info!(
            device = %device_id,
            %code,
            attempts = batch.current.attempts(),
            "multiple ownership transfer resolved"
        );

        if !code.is_ok() && batch.current.is_established() {
            if let Err(err) = self.session.close_session(peer).await {
                warn!(error = %err, %peer, "couldn't close the secure session");
            }

            // the sub-owner PSK of this attempt
            match self.store.remove_credential(&device_id).await {
                Ok(true) => debug!(device = %device_id, "removed the sub-owner PSK"),
                Ok(false) => {}
                Err(err) => warn!(error = %err, "couldn't remove the sub-owner PSK"),
            }
        }

        if oxm.is_pin_based() {
            if let Err(err) = self.session.register_key_provider(KeyProvider::Default).await {
                warn!(error = %err, "couldn't revert the key provider");
            }
        }

        batch.record(device_id, code);
        self.in_flight.clear();

        if !batch.is_complete() && batch.advance() {
            return true;
        }

        if let Some(batch) = self.batch.take() {
            info!(has_error = batch.has_error, "multiple ownership transfer completed");

            batch.finish();
        }

        false
    }
}
