// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
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

#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

//! Multiple Ownership Transfer manager
//!
//! A super owner grants to sub owners the administrative access to a device. The [`MotManager`]
//! exposes the super owner requests and drives the transfer of a batch of devices to the local
//! sub owner.

use std::collections::HashMap;

use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{DeviceId, Error, ResultEntry};
use tracing::{debug, error};

pub mod client;
pub mod device;
pub mod event;
pub mod oxm;
pub mod session;
pub mod storage;
pub mod transfer;

mod batch;
mod super_owner;

#[cfg(test)]
mod mock;

pub use astarte_mot_protocol;
pub use url;

pub use self::client::Transport;
pub use self::device::{DeviceRecord, Endpoint};
pub use self::event::{Event, EventReceiver, EventSender};
pub use self::oxm::PinInput;
pub use self::session::SecureSession;
pub use self::storage::{CredentialStore, HistoryStore};

use self::client::{Pending, RequestId};
use self::oxm::Registry;
use self::transfer::{InFlight, TransferContext};

/// Configuration of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotConfig {
    /// Identifier of the local device, the sub owner.
    pub owner_id: DeviceId,
}

impl MotConfig {
    /// Creates the configuration for the local owner.
    pub fn new(owner_id: DeviceId) -> Self {
        Self { owner_id }
    }
}

/// Result passed to the callback of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionResult<U> {
    /// Context given by the caller
    pub ctx: U,
    /// Result for each device
    pub results: Vec<ResultEntry>,
    /// Set if any device didn't succeed
    pub has_error: bool,
}

/// Callback invoked once with the result of an operation.
pub type ResultCallback<U> = Box<dyn FnOnce(ProvisionResult<U>) + Send>;

/// Multiple ownership transfer manager.
///
/// Owns the state of the transfer and of the pending requests. The completions of the
/// collaborators are delivered with [`MotManager::handle_event`] or [`MotManager::run`].
pub struct MotManager<T, S, D, U = ()> {
    config: MotConfig,
    transport: T,
    session: S,
    store: D,
    pin_input: Box<dyn PinInput>,
    registry: Registry,
    pending: HashMap<RequestId, Pending<U>>,
    batch: Option<TransferContext<U>>,
    in_flight: InFlight,
}

impl<T, S, D, U> MotManager<T, S, D, U> {
    /// Creates a new manager.
    pub fn new<P>(config: MotConfig, transport: T, session: S, store: D, pin_input: P) -> Self
    where
        T: Transport,
        S: SecureSession,
        D: HistoryStore + CredentialStore,
        P: PinInput + 'static,
    {
        Self {
            config,
            transport,
            session,
            store,
            pin_input: Box::new(pin_input),
            registry: Registry::new(),
            pending: HashMap::new(),
            batch: None,
            in_flight: InFlight::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MotConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the mutable transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Returns the secure session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Returns the mutable secure session.
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Returns the store.
    pub fn store(&self) -> &D {
        &self.store
    }

    /// Returns the mutable store.
    pub fn store_mut(&mut self) -> &mut D {
        &mut self.store
    }

    /// Checks if a transfer or a request is waiting for an event.
    pub fn is_busy(&self) -> bool {
        self.batch.is_some() || !self.pending.is_empty()
    }

    /// Results of the transfer in progress.
    pub fn transfer_results(&self) -> Option<&[ResultEntry]> {
        self.batch.as_ref().map(TransferContext::results)
    }
}

impl<T, S, D, U> MotManager<T, S, D, U>
where
    T: Transport,
    S: SecureSession,
    D: HistoryStore + CredentialStore,
{
    /// Handles the completion of a collaborator operation.
    pub async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Handshake { peer, result } => self.on_handshake(peer, result).await,
            Event::Response { id, status } => self.on_response(id, status).await,
        }
    }

    /// Handles the events until no transfer or request is pending.
    pub async fn run(&mut self, events: &mut EventReceiver) -> Result<(), Error> {
        while self.is_busy() {
            let Some(event) = events.recv().await else {
                error!("event channel closed while waiting for a response");

                return Err(Error::new(ErrorKind::Network, "event channel closed"));
            };

            debug!(?event, "event received");

            self.handle_event(event).await;
        }

        Ok(())
    }
}
