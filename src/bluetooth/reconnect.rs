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

//! Delayed reconnect scheduling.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Schedules at most one delayed reconnect attempt at a time.
#[derive(Debug)]
pub struct ReconnectPolicy {
    delay: Duration,
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether an attempt is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Schedule `attempt` to run after the delay.
    ///
    /// `attempt` receives the generation it was scheduled under and must hand
    /// it back to [`ReconnectPolicy::fire`] before reconnecting. Returns `false`
    /// without scheduling anything when an attempt is already pending.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, attempt: F) -> bool
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if self.pending.is_some() {
            debug!("Reconnect already pending, not scheduling another");
            return false;
        }

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let delay = self.delay;
        info!("Reconnect attempt scheduled in {:?}", delay);

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            attempt(generation);
        }));
        true
    }

    /// Claim a fired timer.
    ///
    /// Returns `true` if `generation` is the pending attempt, clearing it.
    /// Timers that were cancelled or superseded get `false`.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.pending.is_some() && generation == self.generation {
            self.pending = None;
            true
        } else {
            debug!("Ignoring stale reconnect timer {}", generation);
            false
        }
    }

    /// Cancel the pending attempt, if any.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                handle.abort();
                info!("Pending reconnect cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for ReconnectPolicy {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
