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

//! Ownership transfer methods and multiple ownership modes.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::error::ErrorKind;

/// Ownership transfer method (OxM).
///
/// ```cddl
/// Oxm /= (
///     JustWorks:        0,
///     RandomDevicePin:  1,
///     ManufacturerCert: 2,
///     PreconfigPin:     3,
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Oxm {
    /// Anonymous key agreement, no secret.
    JustWorks = 0,
    /// PIN displayed by the device and typed by the operator.
    RandomDevicePin = 1,
    /// Manufacturer certificate.
    ManufacturerCert = 2,
    /// PIN configured on the device in advance.
    PreconfigPin = 3,
}

impl Oxm {
    /// All the registered methods.
    pub const ALL: [Oxm; 4] = [
        Oxm::JustWorks,
        Oxm::RandomDevicePin,
        Oxm::ManufacturerCert,
        Oxm::PreconfigPin,
    ];

    /// URN of the method, also used as label for the owner PSK derivation.
    pub fn urn(&self) -> &'static str {
        match self {
            Oxm::JustWorks => "oic.sec.doxm.jw",
            Oxm::RandomDevicePin => "oic.sec.doxm.rdp",
            Oxm::ManufacturerCert => "oic.sec.doxm.mfgcert",
            Oxm::PreconfigPin => "oic.sec.doxm.prcf",
        }
    }

    /// Returns true for the methods that authenticate with a PIN.
    pub fn is_pin_based(&self) -> bool {
        matches!(self, Oxm::RandomDevicePin | Oxm::PreconfigPin)
    }
}

impl TryFrom<u8> for Oxm {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            0 => Oxm::JustWorks,
            1 => Oxm::RandomDevicePin,
            2 => Oxm::ManufacturerCert,
            3 => Oxm::PreconfigPin,
            _ => return Err(Error::new(ErrorKind::OutOfRange, "for Oxm")),
        };

        Ok(value)
    }
}

impl From<Oxm> for u8 {
    fn from(value: Oxm) -> Self {
        value as u8
    }
}

impl Display for Oxm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.urn())
    }
}

impl FromStr for Oxm {
    type Err = Error;

    /// Parses the URN or the short name of the method.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Oxm::ALL
            .into_iter()
            .find(|oxm| oxm.urn() == s || oxm.urn().rsplit('.').next() == Some(s))
            .ok_or(Error::new(ErrorKind::Invalid, "ownership transfer method"))
    }
}

/// Multiple ownership transfer mode of a device.
///
/// ```cddl
/// MomType /= (
///     Disable:      0,
///     Enable:       1,
///     TimelyEnable: 2,
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MomType {
    /// Multiple ownership transfer is disabled.
    Disable = 0,
    /// Multiple ownership transfer is enabled.
    Enable = 1,
    /// Multiple ownership transfer is enabled for a limited time.
    TimelyEnable = 2,
}

impl TryFrom<u8> for MomType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            0 => MomType::Disable,
            1 => MomType::Enable,
            2 => MomType::TimelyEnable,
            _ => return Err(Error::new(ErrorKind::OutOfRange, "for MomType")),
        };

        Ok(value)
    }
}

impl From<MomType> for u8 {
    fn from(value: MomType) -> Self {
        value as u8
    }
}
