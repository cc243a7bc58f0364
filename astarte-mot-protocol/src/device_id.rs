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

//! Identifier of a device or owner.

use std::fmt::{Debug, Display};
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteArray;

use crate::Error;
use crate::error::ErrorKind;
use crate::utils::Hex;

/// Length in bytes of a [`DeviceId`].
pub const DEVICE_ID_LEN: usize = 16;

/// A 128-bit identifier of a device, owner or credential subject.
///
/// ```cddl
/// DeviceId = bstr .size 16
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(ByteArray<DEVICE_ID_LEN>);

impl DeviceId {
    /// Subject matching any sub-owner, used for pre-configured PIN credentials.
    pub const WILDCARD: DeviceId = DeviceId::wildcard();

    /// Create the new id from bytes
    pub fn new(bytes: [u8; DEVICE_ID_LEN]) -> Self {
        Self(bytes.into())
    }

    /// Identifier with all bytes set to zero.
    pub fn empty() -> Self {
        Self::new([0; DEVICE_ID_LEN])
    }

    /// Checks if all bytes are zero.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    const fn wildcard() -> Self {
        let mut bytes = [0; DEVICE_ID_LEN];
        bytes[0] = b'*';

        Self(ByteArray::new(bytes))
    }
}

impl Deref for DeviceId {
    type Target = ByteArray<DEVICE_ID_LEN>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; DEVICE_ID_LEN]> for DeviceId {
    fn from(value: [u8; DEVICE_ID_LEN]) -> Self {
        Self::new(value)
    }
}

impl Debug for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DeviceId")
            .field(&Hex::new(self.0.as_slice()))
            .finish()
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0.as_slice();

        // 8-4-4-4-12
        write!(
            f,
            "{}-{}-{}-{}-{}",
            Hex::new(&b[0..4]),
            Hex::new(&b[4..6]),
            Hex::new(&b[6..8]),
            Hex::new(&b[8..10]),
            Hex::new(&b[10..16]),
        )
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    /// Parses 32 hex digits, dashes are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_digit(16))
            .collect::<Option<Vec<u32>>>()
            .ok_or(Error::new(ErrorKind::Decode, "device id hex digit"))?;

        if digits.len() != DEVICE_ID_LEN * 2 {
            return Err(Error::new(ErrorKind::OutOfRange, "device id length"));
        }

        let mut bytes = [0; DEVICE_ID_LEN];
        for (byte, pair) in bytes.iter_mut().zip(digits.chunks_exact(2)) {
            // both digits are < 16
            *byte = (pair[0] * 16 + pair[1]) as u8;
        }

        Ok(Self::new(bytes))
    }
}
