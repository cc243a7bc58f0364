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

//! Error returned by the library.

use std::fmt::Display;

use crate::result::ResultCode;

/// Error for the protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    ctx: &'static str,
}

impl Error {
    /// Create a new error with the given context.
    pub const fn new(kind: ErrorKind, ctx: &'static str) -> Self {
        Self { kind, ctx }
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the [`ResultCode`] reported to the user for this error.
    pub fn code(&self) -> ResultCode {
        ResultCode::from(self.kind)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.ctx)
    }
}

impl std::error::Error for Error {}

/// Operation for which the [`Error`] was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Couldn't encode data.
    Encode,
    /// Couldn't decode data.
    Decode,
    /// A value is out of range.
    OutOfRange,
    /// A value is invalid.
    Invalid,
    /// The ownership transfer method is not supported.
    Unsupported,
    /// An expected local record is missing.
    NotFound,
    /// Couldn't allocate the resources for the operation.
    NoMemory,
    /// Couldn't complete io operation
    Io,
    /// Couldn't dispatch the request or the transport failed.
    Network,
    /// The secure session handshake was rejected.
    Authentication,
    /// Another transfer is already in progress.
    Busy,
    /// The remote device answered with an error.
    Message,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Encode => write!(f, "couldn't encode"),
            ErrorKind::Decode => write!(f, "couldn't decode"),
            ErrorKind::OutOfRange => write!(f, "value out of range"),
            ErrorKind::Invalid => write!(f, "invalid value"),
            ErrorKind::Unsupported => write!(f, "unsupported"),
            ErrorKind::NotFound => write!(f, "couldn't find"),
            ErrorKind::NoMemory => write!(f, "couldn't allocate"),
            ErrorKind::Io => write!(f, "couldn't complete io operation"),
            ErrorKind::Network => write!(f, "couldn't complete network operation"),
            ErrorKind::Authentication => write!(f, "couldn't authenticate"),
            ErrorKind::Busy => write!(f, "busy"),
            ErrorKind::Message => write!(f, "couldn't process message"),
        }
    }
}
