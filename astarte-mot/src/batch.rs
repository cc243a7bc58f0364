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

//! Start of the transfer for a list of devices.

use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{DeviceId, Error};
use tracing::{error, info, instrument};

use crate::client::Transport;
use crate::device::DeviceRecord;
use crate::session::SecureSession;
use crate::storage::{CredentialStore, HistoryStore};
use crate::transfer::{Step, TransferContext};
use crate::{MotManager, ProvisionResult};

impl<T, S, D, U> MotManager<T, S, D, U>
where
    T: Transport,
    S: SecureSession,
    D: HistoryStore + CredentialStore,
{
    /// Transfers the ownership of the devices to the local sub owner.
    ///
    /// The devices are transferred one at a time in the given order. The callback is invoked
    /// once, after every device has a result.
    ///
    /// If the returned error is set, no device was contacted and the callback is dropped.
    pub async fn start_multi_owner_transfer<F>(
        &mut self,
        ctx: U,
        devices: Vec<DeviceRecord>,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(ProvisionResult<U>) + Send + 'static,
    {
        if devices.is_empty() {
            error!("empty device list");

            return Err(Error::new(ErrorKind::Invalid, "empty device list"));
        }

        if self.batch.is_some() {
            error!("another multiple ownership transfer is in progress");

            return Err(Error::new(ErrorKind::Busy, "transfer in progress"));
        }

        for device in &devices {
            self.registry
                .mot_method(device.doxm.oxm_sel)
                .inspect_err(|_| {
                    error!(device = %device.device_id(), "invalid transfer method for device");
                })?;
        }

        for device in &devices {
            self.reconcile_history(&device.device_id()).await?;
        }

        let batch = TransferContext::new(ctx, devices, Box::new(callback))?;

        info!(
            devices = batch.results().len(),
            "starting multiple ownership transfer"
        );

        self.batch = Some(batch);

        self.drive(Step::Start).await;

        Ok(())
    }

    /// Removes a stale record of the device, errors if it was already transferred.
    #[instrument(skip(self))]
    async fn reconcile_history(&mut self, device_id: &DeviceId) -> Result<(), Error> {
        if !self.store.is_duplicate(device_id).await? {
            return Ok(());
        }

        if !self.store.is_stale(device_id).await? {
            error!("device already in the provisioning history");

            return Err(Error::new(ErrorKind::Invalid, "duplicated device"));
        }

        info!("device is stale, removing it from the provisioning history");

        self.store.delete_device(device_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use astarte_mot_protocol::{Cred, Oxm, ResultCode, ResultEntry};
    use pretty_assertions::assert_eq;
    use zeroize::Zeroizing;

    use super::*;
    use crate::event::{self, Event};
    use crate::mock::{MockSession, MockTransport, collect, device, manager, owner};
    use crate::session::HandshakeResult;
    use crate::storage::{DeviceState, MemoryStore};
    use crate::transfer::WRONG_PIN_MAX_ATTEMPT;
    use crate::{MotConfig, MotManager};

    async fn complete_device<T, S, D>(
        manager: &mut MotManager<T, S, D, u32>,
        dev: &DeviceRecord,
        id: u64,
    ) where
        T: Transport,
        S: SecureSession,
        D: HistoryStore + CredentialStore,
    {
        manager
            .handle_event(Event::Handshake {
                peer: dev.endpoint.secure_addr(),
                result: HandshakeResult::Success,
            })
            .await;
        manager
            .handle_event(Event::Response {
                id: crate::client::RequestId::new(id),
                status: Some(ResultCode::ResourceChanged),
            })
            .await;
    }

    #[tokio::test]
    async fn two_devices_in_order() {
        let (mut manager, prompts) = manager(MemoryStore::new());
        let (results, callback) = collect();
        let first = device(1, Oxm::RandomDevicePin);
        let second = device(2, Oxm::RandomDevicePin);

        manager
            .start_multi_owner_transfer(5, vec![first.clone(), second.clone()], callback)
            .await
            .unwrap();

        assert_eq!(
            manager.transfer_results().unwrap(),
            [
                ResultEntry::pending(first.device_id()),
                ResultEntry::pending(second.device_id())
            ]
        );

        complete_device(&mut manager, &first, 1).await;

        // only the first is resolved
        assert!(results.lock().unwrap().is_empty());
        assert_eq!(
            manager.transfer_results().unwrap()[0].result,
            ResultCode::Ok
        );

        complete_device(&mut manager, &second, 2).await;

        assert_eq!(prompts.load(Ordering::SeqCst), 2);

        let peers: Vec<_> = manager
            .session()
            .calls()
            .iter()
            .filter_map(|call| match call {
                crate::mock::Call::Handshake(peer) => Some(*peer),
                _ => None,
            })
            .collect();
        assert_eq!(
            peers,
            [first.endpoint.secure_addr(), second.endpoint.secure_addr()]
        );

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ctx, 5);
        assert!(!results[0].has_error);
        assert_eq!(
            results[0].results,
            [
                ResultEntry {
                    device_id: first.device_id(),
                    result: ResultCode::Ok
                },
                ResultEntry {
                    device_id: second.device_id(),
                    result: ResultCode::Ok
                },
            ]
        );

        assert_eq!(
            manager.store().state(&first.device_id()),
            Some(DeviceState::Active)
        );
        assert_eq!(
            manager.store().state(&second.device_id()),
            Some(DeviceState::Active)
        );
        assert!(!manager.is_busy());
    }

    #[tokio::test]
    async fn random_pin_three_failures() {
        let (mut manager, prompts) = manager(MemoryStore::new());
        let (results, callback) = collect();
        let dev = device(1, Oxm::RandomDevicePin);

        manager
            .start_multi_owner_transfer(1, vec![dev.clone()], callback)
            .await
            .unwrap();

        for _ in 0..WRONG_PIN_MAX_ATTEMPT {
            assert!(results.lock().unwrap().is_empty());

            manager
                .handle_event(Event::Handshake {
                    peer: dev.endpoint.secure_addr(),
                    result: HandshakeResult::AuthenticationFailure,
                })
                .await;
        }

        assert_eq!(manager.session().handshakes(), 3);
        assert_eq!(prompts.load(Ordering::SeqCst), 3);
        assert!(manager.transport().sent().is_empty());

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].has_error);
        assert_eq!(
            results[0].results[0].result,
            ResultCode::AuthenticationFailure
        );

        // a late handshake is ignored
        drop(results);
        manager
            .handle_event(Event::Handshake {
                peer: dev.endpoint.secure_addr(),
                result: HandshakeResult::AuthenticationFailure,
            })
            .await;
        assert_eq!(manager.session().handshakes(), 3);
    }

    #[tokio::test]
    async fn preconfigured_pin_single_failure() {
        let mut store = MemoryStore::new();
        store
            .add_credential(Cred::pin(DeviceId::WILDCARD, b"12345678").unwrap())
            .await
            .unwrap();

        let (mut manager, _) = manager(store);
        let (results, callback) = collect();
        let dev = device(1, Oxm::PreconfigPin);

        manager
            .start_multi_owner_transfer(1, vec![dev.clone()], callback)
            .await
            .unwrap();

        manager
            .handle_event(Event::Handshake {
                peer: dev.endpoint.secure_addr(),
                result: HandshakeResult::AuthenticationFailure,
            })
            .await;

        assert_eq!(manager.session().handshakes(), 1);

        let results = results.lock().unwrap();
        assert_eq!(
            results[0].results[0].result,
            ResultCode::AuthenticationFailure
        );
    }

    #[tokio::test]
    async fn failure_continues_with_next_device() {
        let (mut manager, _) = manager(MemoryStore::new());
        let (results, callback) = collect();
        let first = device(1, Oxm::RandomDevicePin);
        let second = device(2, Oxm::RandomDevicePin);

        manager
            .start_multi_owner_transfer(1, vec![first.clone(), second.clone()], callback)
            .await
            .unwrap();

        manager
            .handle_event(Event::Handshake {
                peer: first.endpoint.secure_addr(),
                result: HandshakeResult::Error,
            })
            .await;

        assert!(results.lock().unwrap().is_empty());

        complete_device(&mut manager, &second, 1).await;

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].has_error);
        assert_eq!(
            results[0].results[0].result,
            ResultCode::CommunicationError
        );
        assert_eq!(results[0].results[1].result, ResultCode::Ok);
    }

    #[tokio::test]
    async fn stale_duplicate_removed() {
        let dev = device(1, Oxm::RandomDevicePin);
        let mut store = MemoryStore::new();
        store.mark_stale(dev.device_id());

        let (mut manager, _) = manager(store);
        let (_, callback) = collect();

        manager
            .start_multi_owner_transfer(1, vec![dev.clone()], callback)
            .await
            .unwrap();

        assert_eq!(manager.store().state(&dev.device_id()), None);
        assert_eq!(manager.session().handshakes(), 1);
    }

    #[tokio::test]
    async fn active_duplicate_rejected() {
        let dev = device(1, Oxm::RandomDevicePin);
        let mut store = MemoryStore::new();
        store.add_device(&dev.device_id()).await.unwrap();

        let (mut manager, prompts) = manager(store);
        let (results, callback) = collect();

        let err = manager
            .start_multi_owner_transfer(1, vec![device(2, Oxm::RandomDevicePin), dev], callback)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ResultCode::InvalidParam);
        assert_eq!(prompts.load(Ordering::SeqCst), 0);
        assert!(manager.session().calls().is_empty());
        assert!(manager.transport().sent().is_empty());
        assert!(results.lock().unwrap().is_empty());
        assert!(!manager.is_busy());
    }

    #[tokio::test]
    async fn unsupported_method_rejected() {
        let (mut manager, _) = manager(MemoryStore::new());
        let (results, callback) = collect();

        let err = manager
            .start_multi_owner_transfer(
                1,
                vec![
                    device(1, Oxm::RandomDevicePin),
                    device(2, Oxm::JustWorks),
                ],
                callback,
            )
            .await
            .unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Unsupported);
        assert_eq!(err.code(), ResultCode::InvalidParam);
        assert!(manager.session().calls().is_empty());
        assert!(results.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_list_rejected() {
        let (mut manager, _) = manager(MemoryStore::new());
        let (_, callback) = collect();

        let err = manager
            .start_multi_owner_transfer(1, Vec::new(), callback)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ResultCode::InvalidParam);
    }

    #[tokio::test]
    async fn second_batch_busy() {
        let (mut manager, _) = manager(MemoryStore::new());
        let (first_results, callback) = collect();

        manager
            .start_multi_owner_transfer(1, vec![device(1, Oxm::RandomDevicePin)], callback)
            .await
            .unwrap();

        let (results, callback) = collect();
        let err = manager
            .start_multi_owner_transfer(2, vec![device(2, Oxm::RandomDevicePin)], callback)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ResultCode::Busy);
        assert!(results.lock().unwrap().is_empty());
        assert!(first_results.lock().unwrap().is_empty());
        assert_eq!(manager.session().handshakes(), 1);
    }

    #[tokio::test]
    async fn session_start_failure_resolves_device() {
        let (mut manager, _) = manager(MemoryStore::new());
        let (results, callback) = collect();

        manager.session_mut().fail_handshake = true;

        manager
            .start_multi_owner_transfer(
                1,
                vec![device(1, Oxm::RandomDevicePin), device(2, Oxm::RandomDevicePin)],
                callback,
            )
            .await
            .unwrap();

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].has_error);
        assert!(
            results[0]
                .results
                .iter()
                .all(|entry| entry.result == ResultCode::CommunicationError)
        );
        assert!(!manager.is_busy());
    }

    #[derive(Debug, Default)]
    struct ReadOnlyHistory(MemoryStore);

    impl HistoryStore for ReadOnlyHistory {
        async fn is_duplicate(&self, device: &DeviceId) -> Result<bool, Error> {
            self.0.is_duplicate(device).await
        }

        async fn is_stale(&self, device: &DeviceId) -> Result<bool, Error> {
            self.0.is_stale(device).await
        }

        async fn delete_device(&mut self, device: &DeviceId) -> Result<(), Error> {
            self.0.delete_device(device).await
        }

        async fn add_device(&mut self, _device: &DeviceId) -> Result<(), Error> {
            Err(Error::new(ErrorKind::Io, "read only history"))
        }
    }

    impl CredentialStore for ReadOnlyHistory {
        async fn find_credential(&self, subject: &DeviceId) -> Result<Option<Cred>, Error> {
            self.0.find_credential(subject).await
        }

        async fn add_credential(&mut self, cred: Cred) -> Result<(), Error> {
            self.0.add_credential(cred).await
        }

        async fn remove_credential(&mut self, subject: &DeviceId) -> Result<bool, Error> {
            self.0.remove_credential(subject).await
        }
    }

    #[tokio::test]
    async fn history_failure_still_succeeds() {
        let mut manager: MotManager<_, _, _, u32> = MotManager::new(
            MotConfig::new(owner()),
            MockTransport::default(),
            MockSession::default(),
            ReadOnlyHistory::default(),
            |_: &DeviceId| -> Result<Zeroizing<Vec<u8>>, Error> {
                Ok(Zeroizing::new(b"12345678".to_vec()))
            },
        );
        let (results, callback) = collect();
        let dev = device(1, Oxm::RandomDevicePin);

        manager
            .start_multi_owner_transfer(1, vec![dev.clone()], callback)
            .await
            .unwrap();

        complete_device(&mut manager, &dev, 1).await;

        let results = results.lock().unwrap();
        assert!(!results[0].has_error);
        assert_eq!(results[0].results[0].result, ResultCode::Ok);
    }

    #[tokio::test]
    async fn run_until_completed() {
        let (mut manager, _) = manager(MemoryStore::new());
        let (results, callback) = collect();
        let dev = device(1, Oxm::RandomDevicePin);
        let (tx, mut rx) = event::channel();

        manager
            .start_multi_owner_transfer(1, vec![dev.clone()], callback)
            .await
            .unwrap();

        tx.send(Event::Handshake {
            peer: dev.endpoint.secure_addr(),
            result: HandshakeResult::Success,
        })
        .unwrap();
        tx.send(Event::Response {
            id: crate::client::RequestId::new(1),
            status: Some(ResultCode::ResourceChanged),
        })
        .unwrap();

        manager.run(&mut rx).await.unwrap();

        assert!(!manager.is_busy());
        assert_eq!(results.lock().unwrap()[0].results[0].result, ResultCode::Ok);
    }

    #[tokio::test]
    async fn run_channel_closed() {
        let (mut manager, _) = manager(MemoryStore::new());
        let (_, callback) = collect();
        let (tx, mut rx) = event::channel();

        manager
            .start_multi_owner_transfer(1, vec![device(1, Oxm::RandomDevicePin)], callback)
            .await
            .unwrap();

        drop(tx);

        let err = manager.run(&mut rx).await.unwrap_err();

        assert_eq!(err.code(), ResultCode::CommunicationError);
    }
}
