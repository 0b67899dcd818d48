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

//! Session event fan-out.
//!
//! Events reach collaborators two ways: registered [`SessionObserver`]s are
//! called synchronously, and [`EventBroadcaster::subscribe`] hands out a
//! broadcast receiver for async consumers.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Events raised by a device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Link to the device went up or down.
    ConnectionChanged(bool),
    /// The device CLI became usable or unusable.
    CliReadinessChanged(bool),
    /// Text received from the device CLI.
    ResponseText(String),
    /// A device button was pressed (ordinal 1-3).
    ButtonPress(u8),
}

impl SessionEvent {
    /// Call the observer method matching this event.
    pub fn dispatch(&self, observer: &dyn SessionObserver) {
        match self {
            SessionEvent::ConnectionChanged(connected) => {
                observer.on_connection_changed(*connected)
            }
            SessionEvent::CliReadinessChanged(ready) => observer.on_cli_readiness_changed(*ready),
            SessionEvent::ResponseText(text) => observer.on_response_text(text),
            SessionEvent::ButtonPress(button) => observer.on_button_press(*button),
        }
    }
}

/// Receives session events. Every method defaults to doing nothing.
///
/// Observers run on the session's event task and must not block.
pub trait SessionObserver: Send + Sync {
    fn on_connection_changed(&self, _connected: bool) {}

    fn on_cli_readiness_changed(&self, _ready: bool) {}

    fn on_response_text(&self, _text: &str) {}

    fn on_button_press(&self, _button: u8) {}
}

struct Inner {
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
    channel: broadcast::Sender<SessionEvent>,
}

/// Fans session events out to observers and subscribers.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<Inner>,
}

impl EventBroadcaster {
    /// Create a broadcaster whose subscribers may lag by up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                observers: RwLock::new(Vec::new()),
                channel,
            }),
        }
    }

    /// Register an observer.
    pub fn register(&self, observer: Arc<dyn SessionObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Subscribe to events raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.channel.subscribe()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.read().len()
    }

    /// Deliver an event to every observer, then to every subscriber.
    pub fn emit(&self, event: SessionEvent) {
        debug!("Session event: {:?}", event);

        // Snapshot so observers may register others while being called.
        let observers = self.inner.observers.read().clone();
        for observer in &observers {
            event.dispatch(observer.as_ref());
        }

        // No subscribers is not an error.
        let _ = self.inner.channel.send(event);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}
