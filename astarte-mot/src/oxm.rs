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

//! Strategies of the ownership transfer methods.

use astarte_mot_protocol::cred::PRECONFIG_PIN_MAX_SIZE;
use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{DeviceId, Error, Oxm};
use tracing::error;
use zeroize::Zeroizing;

use crate::session::CipherSuite;

/// Length of the PIN generated by a device for the random PIN method.
pub const RANDOM_PIN_SIZE: usize = 8;

/// Prompts the operator for the PIN displayed by a device.
pub trait PinInput: Send {
    /// Reads the PIN for the device, may block until the operator answers.
    fn read_pin(&mut self, device: &DeviceId) -> Result<Zeroizing<Vec<u8>>, Error>;
}

impl<F> PinInput for F
where
    F: FnMut(&DeviceId) -> Result<Zeroizing<Vec<u8>>, Error> + Send,
{
    fn read_pin(&mut self, device: &DeviceId) -> Result<Zeroizing<Vec<u8>>, Error> {
        (self)(device)
    }
}

/// Checks the PIN length.
pub(crate) fn check_pin(pin: &[u8]) -> Result<(), Error> {
    if pin.is_empty() || pin.len() > PRECONFIG_PIN_MAX_SIZE {
        error!(len = pin.len(), "invalid PIN length");

        return Err(Error::new(ErrorKind::OutOfRange, "PIN length"));
    }

    Ok(())
}

/// How the secret of the method is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSecret {
    /// No secret is needed.
    Nothing,
    /// Prompts the operator with the [`PinInput`].
    PromptPin,
    /// Reads the PIN from the local credentials.
    PreconfiguredPin,
}

/// How the secure session is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateSession {
    /// Anonymous ECDH.
    AnonymousEcdh,
    /// ECDHE with the PIN as PSK.
    PinPsk,
}

impl CreateSession {
    /// Cipher suite to select before the handshake.
    pub fn cipher_suite(&self) -> CipherSuite {
        match self {
            CreateSession::AnonymousEcdh => CipherSuite::ECDH_ANON_AES_128_CBC_SHA256,
            CreateSession::PinPsk => CipherSuite::ECDHE_PSK_AES_128_CBC_SHA256,
        }
    }
}

/// Operations of a method, missing ones are not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodEntry {
    /// Loads the secret
    pub load_secret: Option<LoadSecret>,
    /// Creates the session
    pub create_session: Option<CreateSession>,
}

/// Both operations of a method usable for the multiple ownership transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotMethod {
    /// Method
    pub oxm: Oxm,
    /// Loads the secret
    pub load_secret: LoadSecret,
    /// Creates the session
    pub create_session: CreateSession,
}

/// Table of the registered methods.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: [MethodEntry; 4],
}

impl Registry {
    /// Creates the table with the known methods.
    pub fn new() -> Self {
        Self {
            entries: [
                // Oxm::JustWorks
                MethodEntry {
                    load_secret: Some(LoadSecret::Nothing),
                    create_session: Some(CreateSession::AnonymousEcdh),
                },
                // Oxm::RandomDevicePin
                MethodEntry {
                    load_secret: Some(LoadSecret::PromptPin),
                    create_session: Some(CreateSession::PinPsk),
                },
                // Oxm::ManufacturerCert
                MethodEntry {
                    load_secret: None,
                    create_session: None,
                },
                // Oxm::PreconfigPin
                MethodEntry {
                    load_secret: Some(LoadSecret::PreconfiguredPin),
                    create_session: Some(CreateSession::PinPsk),
                },
            ],
        }
    }

    /// Returns the entry for the method.
    pub fn get(&self, oxm: Oxm) -> &MethodEntry {
        &self.entries[usize::from(u8::from(oxm))]
    }

    /// Returns the operations of a method usable for the multiple ownership transfer.
    pub fn mot_method(&self, oxm: Oxm) -> Result<MotMethod, Error> {
        if !oxm.is_pin_based() {
            error!(%oxm, "unsupported method for multiple ownership transfer");

            return Err(Error::new(ErrorKind::Unsupported, "transfer method"));
        }

        let entry = self.get(oxm);

        let (Some(load_secret), Some(create_session)) = (entry.load_secret, entry.create_session)
        else {
            error!(%oxm, "method not implemented");

            return Err(Error::new(ErrorKind::Unsupported, "transfer method"));
        };

        Ok(MotMethod {
            oxm,
            load_secret,
            create_session,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
