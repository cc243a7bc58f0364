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

//! Credential resource (cred).

use std::fmt::Debug;
use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_bytes::{ByteBuf, Bytes};
use zeroize::Zeroizing;

use crate::device_id::DeviceId;
use crate::error::ErrorKind;
use crate::{Error, Resource};

/// Maximum length in bytes of a pre-configured PIN.
pub const PRECONFIG_PIN_MAX_SIZE: usize = 32;

/// Type of credential.
///
/// ```cddl
/// CredType /= (
///     SymmetricPairWiseKey: 1,
///     SymmetricGroupKey:    2,
///     AsymmetricKey:        4,
///     SignedAsymmetricKey:  8,
///     PinPassword:          16,
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum CredType {
    /// Key shared between two devices.
    SymmetricPairWiseKey = 1,
    /// Key shared in a group.
    SymmetricGroupKey = 2,
    /// Public key.
    AsymmetricKey = 4,
    /// Certificate.
    SignedAsymmetricKey = 8,
    /// PIN or password.
    PinPassword = 16,
}

impl TryFrom<u8> for CredType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            1 => CredType::SymmetricPairWiseKey,
            2 => CredType::SymmetricGroupKey,
            4 => CredType::AsymmetricKey,
            8 => CredType::SignedAsymmetricKey,
            16 => CredType::PinPassword,
            _ => return Err(Error::new(ErrorKind::OutOfRange, "for CredType")),
        };

        Ok(value)
    }
}

impl From<CredType> for u8 {
    fn from(value: CredType) -> Self {
        value as u8
    }
}

/// Encoding of the private data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Encoding {
    /// Raw bytes
    Raw = 1,
    /// Base64 text
    Base64 = 2,
}

impl TryFrom<u8> for Encoding {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Encoding::Raw),
            2 => Ok(Encoding::Base64),
            _ => Err(Error::new(ErrorKind::OutOfRange, "for Encoding")),
        }
    }
}

impl From<Encoding> for u8 {
    fn from(value: Encoding) -> Self {
        value as u8
    }
}

/// Secret part of a credential.
///
/// The data is zeroed when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateData {
    data: Zeroizing<Vec<u8>>,
    encoding: Encoding,
}

impl PrivateData {
    /// Create the private data with the given encoding.
    pub fn new(data: Vec<u8>, encoding: Encoding) -> Self {
        Self {
            data: Zeroizing::new(data),
            encoding,
        }
    }

    /// Private data without content.
    pub fn empty(encoding: Encoding) -> Self {
        Self::new(Vec::new(), encoding)
    }

    /// Returns the secret bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the encoding of the data.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl Debug for PrivateData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateData")
            .field("len", &self.data.len())
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct PrivateDataRef<'a> {
    data: &'a Bytes,
    encoding: Encoding,
}

#[derive(Deserialize)]
struct PrivateDataOwned {
    data: ByteBuf,
    encoding: Encoding,
}

impl Serialize for PrivateData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        PrivateDataRef {
            data: Bytes::new(&self.data),
            encoding: self.encoding,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PrivateData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let PrivateDataOwned { data, encoding } = Deserialize::deserialize(deserializer)?;

        Ok(Self::new(data.into_vec(), encoding))
    }
}

/// Credential stored locally or provisioned to a device.
///
/// ```cddl
/// Cred = {
///     "credid":       uint,
///     "subjectuuid":  DeviceId,
///     "credtype":     CredType,
///     "privdata":     { "data": bstr, "encoding": uint },
///     ? "rowneruuid": DeviceId,
///     ? "eowneruuid": DeviceId,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cred {
    /// Local identifier of the credential.
    #[serde(rename = "credid")]
    pub cred_id: u16,
    /// Device the credential authenticates.
    #[serde(rename = "subjectuuid")]
    pub subject: DeviceId,
    /// Type of the credential.
    #[serde(rename = "credtype")]
    pub cred_type: CredType,
    /// Secret of the credential.
    #[serde(rename = "privdata")]
    pub private_data: PrivateData,
    /// Resource owner of the credential.
    #[serde(rename = "rowneruuid", default, skip_serializing_if = "Option::is_none")]
    pub rowner_id: Option<DeviceId>,
    /// Owner that created the credential.
    #[serde(rename = "eowneruuid", default, skip_serializing_if = "Option::is_none")]
    pub eowner_id: Option<DeviceId>,
}

impl Cred {
    /// Creates a PIN credential for the subject.
    ///
    /// The PIN must be between 1 and [`PRECONFIG_PIN_MAX_SIZE`] bytes.
    pub fn pin(subject: DeviceId, pin: &[u8]) -> Result<Self, Error> {
        if pin.is_empty() || pin.len() > PRECONFIG_PIN_MAX_SIZE {
            return Err(Error::new(ErrorKind::OutOfRange, "PIN length"));
        }

        Ok(Self {
            cred_id: 0,
            subject,
            cred_type: CredType::PinPassword,
            private_data: PrivateData::new(pin.to_vec(), Encoding::Raw),
            rowner_id: None,
            eowner_id: None,
        })
    }

    /// Creates a symmetric pair-wise key credential owned by `owner`.
    pub fn symmetric(subject: DeviceId, key: PrivateData, owner: DeviceId) -> Self {
        Self {
            cred_id: 0,
            subject,
            cred_type: CredType::SymmetricPairWiseKey,
            private_data: key,
            rowner_id: Some(owner),
            eowner_id: Some(owner),
        }
    }

    /// Checks if the credential is a PIN or password.
    pub fn is_pin(&self) -> bool {
        self.cred_type == CredType::PinPassword
    }
}

impl Resource for Cred {
    const URI: &'static str = "/oic/sec/cred";

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        ciborium::from_reader(buf).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, "couldn't decode cred");

            Error::new(ErrorKind::Decode, "the cred")
        })
    }

    fn encode<W>(&self, writer: &mut W) -> Result<(), Error>
    where
        W: Write,
    {
        ciborium::into_writer(self, writer).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, "couldn't encode cred");

            Error::new(ErrorKind::Encode, "the cred")
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pin_credential() {
        let cred = Cred::pin(DeviceId::WILDCARD, b"12345678").unwrap();

        assert!(cred.is_pin());
        assert_eq!(cred.private_data.data(), b"12345678");
        assert_eq!(cred.private_data.encoding(), Encoding::Raw);

        let buf = cred.to_vec().unwrap();
        let res = Cred::decode(&buf).unwrap();

        assert_eq!(res, cred);
    }

    #[test]
    fn pin_length() {
        let err = Cred::pin(DeviceId::WILDCARD, b"").unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::OutOfRange);

        let long = [b'1'; PRECONFIG_PIN_MAX_SIZE + 1];
        let err = Cred::pin(DeviceId::WILDCARD, &long).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::OutOfRange);

        assert!(Cred::pin(DeviceId::WILDCARD, &long[1..]).is_ok());
    }

    #[test]
    fn private_data_debug_redacted() {
        let data = PrivateData::new(b"secret".to_vec(), Encoding::Raw);

        insta::assert_snapshot!(format!("{data:?}"), @"PrivateData { len: 6, encoding: Raw, .. }");
    }

    #[test]
    fn symmetric_owner() {
        let owner = DeviceId::new([9; 16]);
        let cred = Cred::symmetric(
            DeviceId::new([1; 16]),
            PrivateData::new(b"a2V5".to_vec(), Encoding::Base64),
            owner,
        );

        assert_eq!(cred.rowner_id, Some(owner));
        assert_eq!(cred.eowner_id, Some(owner));
        assert_eq!(cred.cred_type, CredType::SymmetricPairWiseKey);
    }
}
