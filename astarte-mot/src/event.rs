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

//! Completions delivered by the transport and the secure session.

use std::net::SocketAddr;

use astarte_mot_protocol::error::ErrorKind;
use astarte_mot_protocol::{Error, ResultCode};
use tokio::sync::mpsc;
use tracing::error;

use crate::client::RequestId;
use crate::session::HandshakeResult;

/// Completion of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The handshake with a peer terminated.
    Handshake {
        /// Address and secure port of the peer
        peer: SocketAddr,
        /// Outcome of the handshake
        result: HandshakeResult,
    },
    /// Response to a request sent with the transport.
    ///
    /// A missing status means the request got no response.
    Response {
        /// Identifier returned when sending the request
        id: RequestId,
        /// Status of the response
        status: Option<ResultCode>,
    },
}

/// Creates the channel to deliver events to the manager.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();

    (EventSender(tx), EventReceiver(rx))
}

/// Sends events to the manager.
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    /// Posts the event.
    pub fn send(&self, event: Event) -> Result<(), Error> {
        self.0.send(event).map_err(|err| {
            error!(event = ?err.0, "couldn't send event, receiver dropped");

            Error::new(ErrorKind::Network, "event channel closed")
        })
    }
}

/// Receives the events for the manager.
#[derive(Debug)]
pub struct EventReceiver(mpsc::UnboundedReceiver<Event>);

impl EventReceiver {
    /// Waits for the next event.
    pub async fn recv(&mut self) -> Option<Event> {
        self.0.recv().await
    }

    /// Returns an event if one is ready.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.0.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn send_and_receive() {
        let (tx, mut rx) = channel();

        let event = Event::Response {
            id: RequestId::new(3),
            status: Some(ResultCode::ResourceChanged),
        };

        tx.send(event.clone()).unwrap();

        assert_eq!(rx.recv().await, Some(event));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn send_closed() {
        let (tx, rx) = channel();
        drop(rx);

        let err = tx
            .send(Event::Response {
                id: RequestId::new(1),
                status: None,
            })
            .unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Network);
    }
}
