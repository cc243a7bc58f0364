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

//! Status codes reported for a device.

use std::fmt::Display;

use crate::DeviceId;
use crate::error::ErrorKind;

/// Status of an operation on a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// The operation completed successfully.
    Ok,
    /// The remote resource was updated.
    ResourceChanged,
    /// The operation for the device is still pending.
    Continue,
    /// Invalid or unsupported input.
    InvalidParam,
    /// Couldn't allocate the resources for the operation.
    NoMemory,
    /// An expected local record is missing.
    NoResource,
    /// The request couldn't be dispatched or the transport failed.
    CommunicationError,
    /// The secure session handshake was rejected.
    AuthenticationFailure,
    /// The remote device refused the request.
    Unauthorized,
    /// Another ownership transfer is in progress.
    Busy,
    /// Any other failure.
    Error,
}

impl ResultCode {
    /// The operation for the device is not yet resolved.
    pub fn is_pending(&self) -> bool {
        *self == ResultCode::Continue
    }

    /// Checks if the code is [`ResultCode::Ok`].
    pub fn is_ok(&self) -> bool {
        *self == ResultCode::Ok
    }

    /// Checks if a remote resource update succeeded.
    pub fn is_changed(&self) -> bool {
        *self == ResultCode::ResourceChanged
    }
}

impl From<ErrorKind> for ResultCode {
    fn from(value: ErrorKind) -> Self {
        match value {
            ErrorKind::Invalid | ErrorKind::Unsupported | ErrorKind::OutOfRange => {
                ResultCode::InvalidParam
            }
            ErrorKind::NotFound => ResultCode::NoResource,
            ErrorKind::NoMemory => ResultCode::NoMemory,
            ErrorKind::Network => ResultCode::CommunicationError,
            ErrorKind::Authentication => ResultCode::AuthenticationFailure,
            ErrorKind::Busy => ResultCode::Busy,
            ErrorKind::Encode
            | ErrorKind::Decode
            | ErrorKind::Io
            | ErrorKind::Message => ResultCode::Error,
        }
    }
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultCode::Ok => write!(f, "ok"),
            ResultCode::ResourceChanged => write!(f, "resource changed"),
            ResultCode::Continue => write!(f, "pending"),
            ResultCode::InvalidParam => write!(f, "invalid parameter"),
            ResultCode::NoMemory => write!(f, "no memory"),
            ResultCode::NoResource => write!(f, "no resource"),
            ResultCode::CommunicationError => write!(f, "communication error"),
            ResultCode::AuthenticationFailure => write!(f, "authentication failure"),
            ResultCode::Unauthorized => write!(f, "unauthorized"),
            ResultCode::Busy => write!(f, "busy"),
            ResultCode::Error => write!(f, "error"),
        }
    }
}

/// Result of an operation on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultEntry {
    /// Identifier of the device.
    pub device_id: DeviceId,
    /// Status of the operation.
    pub result: ResultCode,
}

impl ResultEntry {
    /// Creates a pending entry for the device.
    pub fn pending(device_id: DeviceId) -> Self {
        Self {
            device_id,
            result: ResultCode::Continue,
        }
    }

    /// Returns true once the result is no more pending.
    pub fn is_resolved(&self) -> bool {
        !self.result.is_pending()
    }
}
