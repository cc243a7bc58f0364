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

//! Requests to the security resources of a device.
//!
//! Every request is a single POST of a CBOR encoded resource. The response is delivered later as
//! an [`Event::Response`](crate::Event::Response) matched by the [`RequestId`].

use std::fmt::Display;
use std::future::Future;

use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{DeviceId, Error, Resource, ResultCode, ResultEntry};
use tracing::{debug, error, warn};
use url::Url;

use crate::device::DeviceRecord;
use crate::{MotManager, ProvisionResult, ResultCallback};

/// Identifier of a request sent with the [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Create the id from the transport handle.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the transport handle.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Method of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read a resource
    Get,
    /// Update a resource
    Post,
}

/// Delivery guarantee requested to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    /// Non confirmable
    Low,
    /// Confirmable
    High,
}

/// Request to a resource of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method of the request
    pub method: Method,
    /// `coaps` URI of the resource
    pub uri: Url,
    /// Encoded resource
    pub payload: Vec<u8>,
    /// Delivery guarantee
    pub qos: Qos,
}

impl Request {
    /// Builds a confirmable POST of the resource to the secure endpoint of the device.
    pub fn post<R>(device: &DeviceRecord, resource: &R) -> Result<Self, Error>
    where
        R: Resource,
    {
        let payload = resource.to_vec()?;
        let uri = device.endpoint.secure_uri(R::URI)?;

        Ok(Self {
            method: Method::Post,
            uri,
            payload,
            qos: Qos::High,
        })
    }
}

/// Sends the requests to the devices.
pub trait Transport: Send {
    /// Sends the request, returns once it's accepted for transmission.
    ///
    /// The response must be delivered as an [`Event::Response`](crate::Event::Response) with the
    /// returned id.
    fn send(&mut self, request: Request) -> impl Future<Output = Result<RequestId, Error>> + Send;
}

/// One-shot context of a property update or credential POST.
pub(crate) struct ShortRequest<U> {
    ctx: U,
    device_id: DeviceId,
    callback: ResultCallback<U>,
}

impl<U> ShortRequest<U> {
    pub(crate) fn new(ctx: U, device_id: DeviceId, callback: ResultCallback<U>) -> Self {
        Self {
            ctx,
            device_id,
            callback,
        }
    }

    /// Reports the status to the caller and consumes the context.
    pub(crate) fn complete(self, status: Option<ResultCode>) {
        let result = status.unwrap_or_else(|| {
            error!(device = %self.device_id, "missing response");

            ResultCode::Error
        });

        let has_error = !result.is_changed();

        (self.callback)(ProvisionResult {
            ctx: self.ctx,
            results: vec![ResultEntry {
                device_id: self.device_id,
                result,
            }],
            has_error,
        });
    }
}

/// Request waiting for a response.
pub(crate) enum Pending<U> {
    /// Single shot request from the super owner API
    Short(ShortRequest<U>),
    /// Sub-owner credential of the running transfer
    SubOwnerCredential,
}

impl<T, S, D, U> MotManager<T, S, D, U>
where
    T: Transport,
{
    /// Sends the request and registers the response handler.
    pub(crate) async fn send(
        &mut self,
        request: Request,
        pending: Pending<U>,
    ) -> Result<RequestId, Error> {
        debug!(uri = %request.uri, "sending request");

        let id = self.transport.send(request).await.map_err(|err| {
            error!(error = %err, "couldn't send request");

            network_error(err)
        })?;

        if self.pending.insert(id, pending).is_some() {
            warn!(%id, "replaced a pending request with the same id");
        }

        Ok(id)
    }

    /// POSTs the resource and reports the response to the callback.
    pub(crate) async fn post_short<R>(
        &mut self,
        ctx: U,
        device: &DeviceRecord,
        resource: &R,
        callback: ResultCallback<U>,
    ) -> Result<(), Error>
    where
        R: Resource,
    {
        let request = Request::post(device, resource)?;

        let short = ShortRequest::new(ctx, device.device_id(), callback);

        self.send(request, Pending::Short(short)).await?;

        Ok(())
    }
}

fn network_error(err: Error) -> Error {
    match err.kind() {
        ErrorKind::Network | ErrorKind::Busy | ErrorKind::NoMemory => err,
        _ => Error::new(ErrorKind::Network, "request dispatch"),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::{Arc, Mutex};

    use astarte_mot_protocol::{Doxm, Oxm};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::device::Endpoint;

    fn device() -> DeviceRecord {
        DeviceRecord::new(
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 5683, 5684),
            Doxm::new(
                DeviceId::new([2; 16]),
                vec![Oxm::RandomDevicePin],
                Oxm::RandomDevicePin,
            ),
        )
    }

    #[test]
    fn post_doxm_request() {
        let device = device();

        let request = Request::post(&device, &device.doxm).unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.qos, Qos::High);
        assert_eq!(request.uri.as_str(), "coaps://10.0.0.2:5684/oic/sec/doxm");
        assert_eq!(Doxm::decode(&request.payload).unwrap(), device.doxm);
    }

    fn short_request(results: &Arc<Mutex<Vec<ProvisionResult<u8>>>>) -> ShortRequest<u8> {
        let results = Arc::clone(results);

        ShortRequest::new(
            7,
            DeviceId::new([2; 16]),
            Box::new(move |res| results.lock().unwrap().push(res)),
        )
    }

    #[test]
    fn short_request_changed() {
        let results = Arc::new(Mutex::new(Vec::new()));

        short_request(&results).complete(Some(ResultCode::ResourceChanged));

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ctx, 7);
        assert!(!results[0].has_error);
        assert_eq!(
            results[0].results,
            [ResultEntry {
                device_id: DeviceId::new([2; 16]),
                result: ResultCode::ResourceChanged
            }]
        );
    }

    #[test]
    fn short_request_refused() {
        let results = Arc::new(Mutex::new(Vec::new()));

        short_request(&results).complete(Some(ResultCode::Unauthorized));

        let results = results.lock().unwrap();
        assert!(results[0].has_error);
        assert_eq!(results[0].results[0].result, ResultCode::Unauthorized);
    }

    #[test]
    fn short_request_missing_response() {
        let results = Arc::new(Mutex::new(Vec::new()));

        short_request(&results).complete(None);

        let results = results.lock().unwrap();
        assert!(results[0].has_error);
        assert_eq!(results[0].results[0].result, ResultCode::Error);
    }

    #[test]
    fn request_id_display() {
        insta::assert_snapshot!(RequestId::new(42), @"#42");
    }
}
