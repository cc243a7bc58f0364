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

//! Security resources exchanged during a Multiple Ownership Transfer.
//!
//! The resources are encoded as CBOR maps with the short names used on the wire.

#![warn(missing_docs)]

use std::io::Write;

pub mod cred;
pub mod device_id;
pub mod doxm;
pub mod error;
pub mod oxm;
pub mod result;
pub mod utils;

pub use self::cred::Cred;
pub use self::device_id::DeviceId;
pub use self::doxm::Doxm;
pub use self::error::Error;
pub use self::oxm::{MomType, Oxm};
pub use self::result::{ResultCode, ResultEntry};

/// A security resource hosted by a device.
pub trait Resource: Sized {
    /// Path of the resource on the device.
    const URI: &'static str;

    /// Decodes the resource from the CBOR payload.
    fn decode(buf: &[u8]) -> Result<Self, Error>;

    /// Encodes the resource into the writer.
    fn encode<W>(&self, writer: &mut W) -> Result<(), Error>
    where
        W: Write;

    /// Encodes the resource into a new buffer.
    fn to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();

        self.encode(&mut buf)?;

        Ok(buf)
    }
}
