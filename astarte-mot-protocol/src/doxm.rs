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

//! Device ownership transfer metadata (doxm).
//!
//! The resource describes the owned state of a device, the supported and selected ownership
//! transfer methods and the multiple ownership transfer mode.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::device_id::DeviceId;
use crate::oxm::{MomType, Oxm};
use crate::{Error, Resource};

/// Multiple ownership transfer configuration of the device.
///
/// ```cddl
/// Mom = {
///     "md": MomType,
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mom {
    /// Current mode
    #[serde(rename = "md")]
    pub mode: MomType,
}

/// Ownership metadata document.
///
/// ```cddl
/// Doxm = {
///     "oxms":         [* Oxm],
///     "oxmsel":       Oxm,
///     "sct":          uint,
///     "owned":        bool,
///     "deviceuuid":   DeviceId,
///     "devowneruuid": DeviceId,
///     "rowneruuid":   DeviceId,
///     ? "mom":        Mom,
///     ? "subowneruuid": [* DeviceId],
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doxm {
    /// Supported ownership transfer methods.
    #[serde(rename = "oxms")]
    pub oxms: Vec<Oxm>,
    /// Selected ownership transfer method.
    #[serde(rename = "oxmsel")]
    pub oxm_sel: Oxm,
    /// Supported credential types bitmask.
    #[serde(rename = "sct")]
    pub sct: u8,
    /// Whether the device is owned.
    #[serde(rename = "owned")]
    pub owned: bool,
    /// Identifier of the device.
    #[serde(rename = "deviceuuid")]
    pub device_id: DeviceId,
    /// Identifier of the device owner.
    #[serde(rename = "devowneruuid")]
    pub dev_owner_id: DeviceId,
    /// Identifier of the resource owner.
    #[serde(rename = "rowneruuid")]
    pub rowner_id: DeviceId,
    /// Multiple ownership transfer mode.
    #[serde(rename = "mom", default, skip_serializing_if = "Option::is_none")]
    pub mom: Option<Mom>,
    /// Sub-owners already registered on the device.
    #[serde(rename = "subowneruuid", default, skip_serializing_if = "Vec::is_empty")]
    pub sub_owners: Vec<DeviceId>,
}

impl Doxm {
    /// Creates an owned document for the device with the given methods.
    pub fn new(device_id: DeviceId, oxms: Vec<Oxm>, oxm_sel: Oxm) -> Self {
        Self {
            oxms,
            oxm_sel,
            sct: 1,
            owned: true,
            device_id,
            dev_owner_id: DeviceId::empty(),
            rowner_id: DeviceId::empty(),
            mom: None,
            sub_owners: Vec::new(),
        }
    }

    /// Checks if the method is in the supported list.
    pub fn supports(&self, oxm: Oxm) -> bool {
        self.oxms.contains(&oxm)
    }

    /// Sets or replaces the multiple ownership transfer mode.
    pub fn set_mode(&mut self, mode: MomType) {
        match &mut self.mom {
            Some(mom) => mom.mode = mode,
            None => self.mom = Some(Mom { mode }),
        }
    }
}

impl Resource for Doxm {
    const URI: &'static str = "/oic/sec/doxm";

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        ciborium::from_reader(buf).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, "couldn't decode doxm");

            Error::new(crate::error::ErrorKind::Decode, "the doxm")
        })
    }

    fn encode<W>(&self, writer: &mut W) -> Result<(), Error>
    where
        W: Write,
    {
        ciborium::into_writer(self, writer).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, "couldn't encode doxm");

            Error::new(crate::error::ErrorKind::Encode, "the doxm")
        })
    }
}
