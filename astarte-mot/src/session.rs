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

//! Secure session with the device.
//!
//! The handshake and the key derivation are provided by the DTLS stack, the manager only drives
//! them.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::net::SocketAddr;

use astarte_mot_protocol::{DeviceId, Error, Oxm};
use zeroize::Zeroizing;

/// Length of the owner PSK derived from the session.
pub const OWNER_PSK_LEN: usize = 16;

/// Cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    /// `TLS_ECDHE_PSK_WITH_AES_128_CBC_SHA256`, see RFC 5489
    pub const ECDHE_PSK_AES_128_CBC_SHA256: CipherSuite = CipherSuite(0xC037);
    /// `TLS_ECDH_anon_WITH_AES_128_CBC_SHA256`
    pub const ECDH_ANON_AES_128_CBC_SHA256: CipherSuite = CipherSuite(0xFF00);
}

impl Display for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

/// Outcome of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeResult {
    /// The session is established.
    Success,
    /// The peer rejected the credentials.
    AuthenticationFailure,
    /// Any other failure.
    Error,
}

/// Source of the PSK used during the handshake.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyProvider {
    /// The credentials stored on the local device.
    Default,
    /// The PIN of a PIN based transfer method.
    Pin {
        /// Method the PIN is used for
        oxm: Oxm,
        /// Device the PIN belongs to
        device_id: DeviceId,
        /// The PIN
        pin: Zeroizing<Vec<u8>>,
    },
}

impl Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Pin { oxm, device_id, .. } => f
                .debug_struct("Pin")
                .field("oxm", oxm)
                .field("device_id", device_id)
                .finish_non_exhaustive(),
        }
    }
}

/// DTLS session operations.
pub trait SecureSession: Send {
    /// Asks the stack to deliver the handshake results as
    /// [`Event::Handshake`](crate::Event::Handshake).
    fn register_handshake_observer(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Replaces the PSK source for the next handshakes.
    fn register_key_provider(
        &mut self,
        provider: KeyProvider,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Selects the cipher suite for the sessions.
    fn select_cipher_suite(
        &mut self,
        suite: CipherSuite,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Starts the handshake, the result is delivered as an event.
    fn initiate_handshake(
        &mut self,
        peer: SocketAddr,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Closes the session with the peer.
    fn close_session(&mut self, peer: SocketAddr) -> impl Future<Output = Result<(), Error>> + Send;

    /// Derives the owner PSK from the established session.
    fn derive_psk(
        &mut self,
        peer: SocketAddr,
        label: &[u8],
        owner: &DeviceId,
        device: &DeviceId,
    ) -> impl Future<Output = Result<Zeroizing<Vec<u8>>, Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_suite_display() {
        insta::assert_snapshot!(CipherSuite::ECDHE_PSK_AES_128_CBC_SHA256, @"0xC037");
        insta::assert_snapshot!(CipherSuite::ECDH_ANON_AES_128_CBC_SHA256, @"0xFF00");
    }

    #[test]
    fn key_provider_redacted() {
        let provider = KeyProvider::Pin {
            oxm: Oxm::RandomDevicePin,
            device_id: DeviceId::new([1; 16]),
            pin: Zeroizing::new(b"12345678".to_vec()),
        };

        insta::assert_snapshot!(
            format!("{provider:?}"),
            @"Pin { oxm: RandomDevicePin, device_id: DeviceId(01010101010101010101010101010101), .. }"
        );
    }
}
