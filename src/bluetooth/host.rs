// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide owner of the device session.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::{DeviceSession, SessionSettings};
use super::transport::{ScanFilter, Transport, TransportEvent};
use crate::events::{EventBroadcaster, SessionEvent};

/// How long shutdown waits for the transport to confirm the disconnect.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Owns the transport and at most one [`DeviceSession`].
///
/// Transport events are pumped to whichever session is current; events that
/// arrive while no session exists are dropped.
pub struct SessionHost {
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    events: EventBroadcaster,
    transport_events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    current: Arc<Mutex<Option<DeviceSession>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHost {
    pub fn new(
        transport: Arc<dyn Transport>,
        transport_events: mpsc::Receiver<TransportEvent>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            transport,
            settings,
            events: EventBroadcaster::default(),
            transport_events: Mutex::new(Some(transport_events)),
            current: Arc::new(Mutex::new(None)),
            pump: Mutex::new(None),
        }
    }

    /// Broadcaster shared by every session this host creates.
    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Start the session, or return the one that already exists.
    ///
    /// A second call with different arguments does not restart anything.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, filter: ScanFilter, auto_reconnect: bool) -> DeviceSession {
        let mut current = self.current.lock();
        if let Some(session) = current.as_ref() {
            debug!("Session already exists, reusing it");
            return session.clone();
        }

        self.ensure_pump();
        let session = DeviceSession::new(
            self.transport.clone(),
            self.events.clone(),
            self.settings.clone(),
            filter,
            auto_reconnect,
        );
        *current = Some(session.clone());
        drop(current);

        session.start();
        session
    }

    /// The current session, if one was started.
    pub fn session(&self) -> Option<DeviceSession> {
        self.current.lock().clone()
    }

    /// Disconnect and forget the current session.
    ///
    /// Waits (bounded) until the transport confirms the link is down so the
    /// teardown reaches the radio before the process exits. Returns `false`
    /// when there was no session.
    pub async fn shutdown(&self) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        info!("Shutting down device session");

        let mut events = self.events.subscribe();
        if session.disconnect().await {
            let confirmed = async {
                loop {
                    match events.recv().await {
                        Ok(SessionEvent::ConnectionChanged(false))
                        | Err(RecvError::Closed) => break,
                        _ => {}
                    }
                }
            };
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, confirmed).await.is_err() {
                warn!("Disconnect not confirmed within {:?}", SHUTDOWN_TIMEOUT);
            }
        }

        session.cancel_reconnect();
        self.current.lock().take();
        true
    }

    fn ensure_pump(&self) {
        let Some(mut rx) = self.transport_events.lock().take() else {
            return;
        };

        let current = self.current.clone();
        *self.pump.lock() = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let session = current.lock().clone();
                match session {
                    Some(session) => session.handle_event(event),
                    None => debug!("No session, dropping {:?}", event),
                }
            }
            info!("Transport event stream closed");
        }));
    }
}

impl Drop for SessionHost {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}
