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

//! Provisioning history and local credentials.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;

use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{Cred, DeviceId, Error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::{DirBuilder, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument};

/// State of a device in the provisioning history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum DeviceState {
    /// The transfer completed.
    Active = 0,
    /// The transfer didn't complete or the device was removed.
    Stale = 1,
}

impl TryFrom<u8> for DeviceState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceState::Active),
            1 => Ok(DeviceState::Stale),
            _ => Err(Error::new(ErrorKind::OutOfRange, "for DeviceState")),
        }
    }
}

impl From<DeviceState> for u8 {
    fn from(value: DeviceState) -> Self {
        value as u8
    }
}

/// Records the devices already provisioned.
pub trait HistoryStore: Send + Sync {
    /// Checks if the device is already in the history.
    fn is_duplicate(&self, device: &DeviceId) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Checks if the device is recorded as stale.
    fn is_stale(&self, device: &DeviceId) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes the device from the history.
    fn delete_device(
        &mut self,
        device: &DeviceId,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Records the device as provisioned.
    fn add_device(&mut self, device: &DeviceId) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Credentials of the local device.
pub trait CredentialStore: Send + Sync {
    /// Returns the credential for the subject.
    fn find_credential(
        &self,
        subject: &DeviceId,
    ) -> impl Future<Output = Result<Option<Cred>, Error>> + Send;

    /// Stores the credential, assigning it a new id.
    fn add_credential(&mut self, cred: Cred) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes all the credentials of the subject, returns true if any was removed.
    fn remove_credential(
        &mut self,
        subject: &DeviceId,
    ) -> impl Future<Output = Result<bool, Error>> + Send;
}

fn next_cred_id(creds: &[Cred]) -> u16 {
    creds
        .iter()
        .map(|cred| cred.cred_id)
        .max()
        .map_or(1, |id| id.saturating_add(1))
}

/// Volatile store, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    history: BTreeMap<DeviceId, DeviceState>,
    creds: Vec<Cred>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the device as stale.
    pub fn mark_stale(&mut self, device: DeviceId) {
        self.history.insert(device, DeviceState::Stale);
    }

    /// State of the device in the history.
    pub fn state(&self, device: &DeviceId) -> Option<DeviceState> {
        self.history.get(device).copied()
    }

    /// Stored credentials.
    pub fn credentials(&self) -> &[Cred] {
        &self.creds
    }
}

impl HistoryStore for MemoryStore {
    async fn is_duplicate(&self, device: &DeviceId) -> Result<bool, Error> {
        Ok(self.history.contains_key(device))
    }

    async fn is_stale(&self, device: &DeviceId) -> Result<bool, Error> {
        Ok(self.state(device) == Some(DeviceState::Stale))
    }

    async fn delete_device(&mut self, device: &DeviceId) -> Result<(), Error> {
        self.history.remove(device);

        Ok(())
    }

    async fn add_device(&mut self, device: &DeviceId) -> Result<(), Error> {
        self.history.insert(*device, DeviceState::Active);

        Ok(())
    }
}

impl CredentialStore for MemoryStore {
    async fn find_credential(&self, subject: &DeviceId) -> Result<Option<Cred>, Error> {
        Ok(self
            .creds
            .iter()
            .find(|cred| cred.subject == *subject)
            .cloned())
    }

    async fn add_credential(&mut self, mut cred: Cred) -> Result<(), Error> {
        cred.cred_id = next_cred_id(&self.creds);

        self.creds.push(cred);

        Ok(())
    }

    async fn remove_credential(&mut self, subject: &DeviceId) -> Result<bool, Error> {
        let len = self.creds.len();

        self.creds.retain(|cred| cred.subject != *subject);

        Ok(self.creds.len() != len)
    }
}

const HISTORY_FILE: &str = "history.cbor";
const CRED_FILE: &str = "cred.cbor";

/// Store persisted as CBOR files in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the directory to use as file storage
    pub async fn open(dir: PathBuf) -> io::Result<Self> {
        let mut builder = DirBuilder::new();
        builder.recursive(true).mode(0o700);

        builder.create(&dir).await?;

        Ok(Self { dir })
    }

    /// Records the device as stale.
    pub async fn mark_stale(&mut self, device: DeviceId) -> Result<(), Error> {
        let mut history = self.history().await?;

        history.insert(device, DeviceState::Stale);

        self.overwrite(HISTORY_FILE, &history).await
    }

    async fn history(&self) -> Result<BTreeMap<DeviceId, DeviceState>, Error> {
        self.read(HISTORY_FILE)
            .await
            .map(Option::unwrap_or_default)
    }

    async fn creds(&self) -> Result<Vec<Cred>, Error> {
        self.read(CRED_FILE).await.map(Option::unwrap_or_default)
    }

    #[instrument(skip(self))]
    async fn read<T>(&self, file: &str) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned,
    {
        let buf = match tokio::fs::read(self.dir.join(file)).await {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                error!(error = %err, "couldn't read file");

                return Err(Error::new(ErrorKind::Io, "couldn't read file"));
            }
        };

        ciborium::from_reader(buf.as_slice())
            .map(Some)
            .map_err(|err| {
                error!(error = %err, "couldn't decode file");

                Error::new(ErrorKind::Decode, "store file")
            })
    }

    #[instrument(skip(self, value))]
    async fn overwrite<T>(&self, file: &str, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).map_err(|err| {
            error!(error = %err, "couldn't encode file");

            Error::new(ErrorKind::Encode, "store file")
        })?;

        let mut file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o700)
            .open(self.dir.join(file))
            .await
            .map_err(|err| {
                error!(error = %err, "couldn't create file");

                Error::new(ErrorKind::Io, "couldn't create file")
            })?;

        file.write_all(&buf).await.map_err(|err| {
            error!(error = %err, "couldn't write to file");

            Error::new(ErrorKind::Io, "couldn't write to file")
        })?;

        file.flush().await.map_err(|err| {
            error!(error = %err, "couldn't flush file");

            Error::new(ErrorKind::Io, "couldn't flush file")
        })?;

        Ok(())
    }
}

impl HistoryStore for FileStore {
    #[instrument(skip(self))]
    async fn is_duplicate(&self, device: &DeviceId) -> Result<bool, Error> {
        self.history()
            .await
            .map(|history| history.contains_key(device))
    }

    #[instrument(skip(self))]
    async fn is_stale(&self, device: &DeviceId) -> Result<bool, Error> {
        self.history()
            .await
            .map(|history| history.get(device) == Some(&DeviceState::Stale))
    }

    #[instrument(skip(self))]
    async fn delete_device(&mut self, device: &DeviceId) -> Result<(), Error> {
        let mut history = self.history().await?;

        if history.remove(device).is_none() {
            debug!("device not in history");

            return Ok(());
        }

        self.overwrite(HISTORY_FILE, &history).await
    }

    #[instrument(skip(self))]
    async fn add_device(&mut self, device: &DeviceId) -> Result<(), Error> {
        let mut history = self.history().await?;

        history.insert(*device, DeviceState::Active);

        self.overwrite(HISTORY_FILE, &history).await
    }
}

impl CredentialStore for FileStore {
    #[instrument(skip(self))]
    async fn find_credential(&self, subject: &DeviceId) -> Result<Option<Cred>, Error> {
        self.creds()
            .await
            .map(|creds| creds.into_iter().find(|cred| cred.subject == *subject))
    }

    #[instrument(skip(self, cred))]
    async fn add_credential(&mut self, mut cred: Cred) -> Result<(), Error> {
        let mut creds = self.creds().await?;

        cred.cred_id = next_cred_id(&creds);
        creds.push(cred);

        self.overwrite(CRED_FILE, &creds).await
    }

    #[instrument(skip(self))]
    async fn remove_credential(&mut self, subject: &DeviceId) -> Result<bool, Error> {
        let mut creds = self.creds().await?;
        let len = creds.len();

        creds.retain(|cred| cred.subject != *subject);

        if creds.len() == len {
            return Ok(false);
        }

        self.overwrite(CRED_FILE, &creds).await?;

        Ok(true)
    }
}
