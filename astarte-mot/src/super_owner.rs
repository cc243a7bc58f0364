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

//! Requests of the super owner to configure the multiple ownership transfer of a device.

use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{Cred, DeviceId, Error, MomType, Oxm, ResultCode, ResultEntry};
use tracing::{debug, error, info, instrument};

use crate::client::Transport;
use crate::device::DeviceRecord;
use crate::oxm::check_pin;
use crate::storage::CredentialStore;
use crate::{MotManager, ProvisionResult};

impl<T, S, D, U> MotManager<T, S, D, U>
where
    T: Transport,
    D: CredentialStore,
{
    /// Updates the multiple ownership transfer mode of the device.
    #[instrument(skip_all, fields(device = %device.device_id(), ?mode))]
    pub async fn change_transfer_mode<F>(
        &mut self,
        ctx: U,
        device: &DeviceRecord,
        mode: MomType,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(ProvisionResult<U>) + Send + 'static,
    {
        let mut doxm = device.doxm.clone();
        doxm.set_mode(mode);

        self.post_short(ctx, device, &doxm, Box::new(callback)).await
    }

    /// Adds a method to the transfer methods supported by the device.
    ///
    /// If the method is already supported the callback is invoked immediately with a success,
    /// without contacting the device.
    #[instrument(skip_all, fields(device = %device.device_id(), %oxm))]
    pub async fn add_transfer_method<F>(
        &mut self,
        ctx: U,
        device: &mut DeviceRecord,
        oxm: Oxm,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(ProvisionResult<U>) + Send + 'static,
    {
        if device.doxm.supports(oxm) {
            info!("method already supported");

            callback(ProvisionResult {
                ctx,
                results: vec![ResultEntry {
                    device_id: device.device_id(),
                    result: ResultCode::Ok,
                }],
                has_error: false,
            });

            return Ok(());
        }

        device.doxm.oxms.push(oxm);

        self.post_short(ctx, device, &device.doxm, Box::new(callback)).await
    }

    /// Selects the transfer method the device will use with the sub owners.
    #[instrument(skip_all, fields(device = %device.device_id(), %oxm))]
    pub async fn select_transfer_method<F>(
        &mut self,
        ctx: U,
        device: &DeviceRecord,
        oxm: Oxm,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(ProvisionResult<U>) + Send + 'static,
    {
        if !device.doxm.supports(oxm) {
            error!(supported = ?device.doxm.oxms, "method not supported by the device");

            return Err(Error::new(ErrorKind::Invalid, "method not supported"));
        }

        let mut doxm = device.doxm.clone();
        doxm.oxm_sel = oxm;

        self.post_short(ctx, device, &doxm, Box::new(callback)).await
    }

    /// Provisions a PIN shared with every sub owner on the device.
    #[instrument(skip_all, fields(device = %device.device_id()))]
    pub async fn provision_preconfigured_pin<F>(
        &mut self,
        ctx: U,
        device: &DeviceRecord,
        pin: &[u8],
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(ProvisionResult<U>) + Send + 'static,
    {
        let cred = Cred::pin(DeviceId::WILDCARD, pin).inspect_err(|err| {
            error!(error = %err, len = pin.len(), "invalid pre-configured PIN");
        })?;

        self.post_short(ctx, device, &cred, Box::new(callback)).await
    }

    /// Stores locally the PIN pre-configured on the device.
    ///
    /// An existing credential of the device is kept.
    #[instrument(skip_all, fields(device = %device.device_id()))]
    pub async fn add_preconfigured_pin(
        &mut self,
        device: &DeviceRecord,
        pin: &[u8],
    ) -> Result<(), Error> {
        check_pin(pin)?;

        let device_id = device.device_id();

        if self.store.find_credential(&device_id).await?.is_some() {
            debug!("credential already present");

            return Ok(());
        }

        let cred = Cred::pin(device_id, pin)?;

        self.store.add_credential(cred).await.inspect_err(|err| {
            error!(error = %err, "couldn't store the pre-configured PIN");
        })
    }
}
