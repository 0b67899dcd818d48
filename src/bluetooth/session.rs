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

//! Device session: connection lifecycle and CLI command dispatch.
//!
//! The session reacts to [`TransportEvent`]s one at a time and exposes the
//! device CLI as typed commands. Every command returns whether it was accepted
//! for transmission; whether the device acted on it is only visible through a
//! later response event.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::ble_constants::{self, *};
use super::protocol::{
    decode_notification, parse_structured_event, CliCommand, MotorFrame, StructuredEvent,
};
use super::transport::{
    CharacteristicRef, GattService, PeripheralInfo, ScanFilter, Transport, TransportEvent,
};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::pattern::{FrameSource, PatternHandle, PatternWorker};
use crate::state::{ConnectionState, SessionState};

const UART_WRITE: CharacteristicRef =
    CharacteristicRef::new(UART_SERVICE_UUID, UART_RX_WRITE_UUID);
const UART_NOTIFY: CharacteristicRef =
    CharacteristicRef::new(UART_SERVICE_UUID, UART_TX_NOTIFY_UUID);
const MANUFACTURER_NAME: CharacteristicRef =
    CharacteristicRef::new(DIS_SERVICE_UUID, MANUFACTURER_NAME_UUID);

/// Timing and sizing of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Actuators on the device; every motor frame has exactly this length.
    pub motor_count: usize,
    /// Wait before an automatic reconnect attempt.
    pub reconnect_delay: Duration,
    /// Wait between resuming the onboard algorithm and dropping the link.
    pub disconnect_grace: Duration,
    /// Cadence of streamed pattern frames.
    pub frame_interval: Duration,
    /// Also reconnect after a locally requested disconnect.
    pub reconnect_after_requested_disconnect: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            motor_count: ble_constants::config::DEFAULT_MOTOR_COUNT,
            reconnect_delay: Duration::from_millis(ble_constants::config::RECONNECT_DELAY_MS),
            disconnect_grace: Duration::from_millis(ble_constants::config::DISCONNECT_GRACE_MS),
            frame_interval: Duration::from_millis(ble_constants::config::FRAME_INTERVAL_MS),
            reconnect_after_requested_disconnect: false,
        }
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    events: EventBroadcaster,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    pattern: Mutex<Option<PatternHandle>>,
}

/// Handle to the session with one haptic device.
///
/// Cheap to clone; all clones drive the same session. Obtain one through
/// [`SessionHost::start`](super::SessionHost::start).
#[derive(Clone)]
pub struct DeviceSession {
    shared: Arc<Shared>,
}

impl DeviceSession {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        events: EventBroadcaster,
        settings: SessionSettings,
        filter: ScanFilter,
        auto_reconnect: bool,
    ) -> Self {
        let state = SessionState::new(filter, auto_reconnect, settings.reconnect_delay);
        Self {
            shared: Arc::new(Shared {
                transport,
                events,
                settings,
                state: Mutex::new(state),
                pattern: Mutex::new(None),
            }),
        }
    }

    /// Leave `Idle` and start scanning for the device.
    pub(crate) fn start(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.connection != ConnectionState::Idle {
            debug!("Session already started ({})", state.connection.as_str());
            return false;
        }
        info!(
            "Starting session via {} (filter: {:?}, auto-reconnect: {})",
            self.shared.transport.backend_name(),
            state.filter,
            state.auto_reconnect
        );
        self.begin_scan(&mut state)
    }

    /// Apply one transport event.
    pub fn handle_event(&self, event: TransportEvent) {
        let mut emitted = Vec::new();
        {
            let mut state = self.shared.state.lock();
            match event {
                TransportEvent::Discovered(peripheral) => {
                    self.on_discovered(&mut state, peripheral);
                }
                TransportEvent::Connected(peripheral) => {
                    self.on_connected(&mut state, peripheral, &mut emitted);
                }
                TransportEvent::ConnectionFailed { peripheral, reason } => {
                    if state.connection == ConnectionState::Connecting {
                        error!(
                            "Connection to '{}' failed: {}",
                            peripheral.display_name(),
                            reason
                        );
                        self.on_link_down(&mut state, &mut emitted, true);
                    } else {
                        debug!("Ignoring stale connection failure: {}", reason);
                    }
                }
                TransportEvent::ServicesDiscovered { peripheral, services } => {
                    self.on_services_discovered(&mut state, &peripheral, &services, &mut emitted);
                }
                TransportEvent::NotificationStateChanged {
                    characteristic,
                    enabled,
                    error,
                } => match error {
                    None => info!(
                        "Notify set to '{}' for {}",
                        if enabled { "on" } else { "off" },
                        characteristic.characteristic
                    ),
                    Some(e) => error!(
                        "Changing notification state failed for {}: {}",
                        characteristic.characteristic, e
                    ),
                },
                TransportEvent::CharacteristicValue {
                    characteristic,
                    value,
                } => {
                    self.on_value(&mut state, characteristic, &value, &mut emitted);
                }
                TransportEvent::WriteComplete {
                    characteristic,
                    value,
                    error,
                } => {
                    let text = decode_notification(&value);
                    match error {
                        None => debug!(
                            "Wrote <{}> to {}",
                            text.trim_end(),
                            characteristic.characteristic
                        ),
                        Some(e) => error!(
                            "Failed writing <{}> to {}: {}",
                            text.trim_end(),
                            characteristic.characteristic,
                            e
                        ),
                    }
                }
                TransportEvent::Disconnected { peripheral, reason } => {
                    self.on_disconnected(&mut state, &peripheral, reason, &mut emitted);
                }
            }
        }

        // Observers may call back into the session, so the lock is released first.
        for event in emitted {
            self.shared.events.emit(event);
        }
    }

    fn on_discovered(&self, state: &mut SessionState, peripheral: PeripheralInfo) {
        if state.connection != ConnectionState::Scanning {
            return;
        }
        if !state.filter.matches(&peripheral) {
            debug!("Skipping peripheral '{}'", peripheral.display_name());
            return;
        }

        info!("Found peripheral '{}'", peripheral.display_name());
        if let Err(e) = self.shared.transport.stop_scan() {
            warn!("Failed to stop scan: {}", e);
        }

        match self.shared.transport.connect(&peripheral) {
            Ok(()) => state.set_connecting(peripheral),
            Err(e) => {
                error!("Failed to request connection: {}", e);
                state.set_disconnected();
            }
        }
    }

    fn on_connected(
        &self,
        state: &mut SessionState,
        peripheral: PeripheralInfo,
        emitted: &mut Vec<SessionEvent>,
    ) {
        if state.connection != ConnectionState::Connecting {
            warn!(
                "Unexpected connection to '{}' while {}",
                peripheral.display_name(),
                state.connection.as_str()
            );
            return;
        }

        info!("Connected to '{}'", peripheral.display_name());
        state.reconnect.cancel();
        state.disconnect_requested = false;
        state.set_connected(peripheral.clone());
        emitted.push(SessionEvent::ConnectionChanged(true));

        if let Err(e) = self.shared.transport.discover_services(&peripheral) {
            error!("Failed to request service discovery: {}", e);
        }
    }

    fn on_services_discovered(
        &self,
        state: &mut SessionState,
        peripheral: &PeripheralInfo,
        services: &[GattService],
        emitted: &mut Vec<SessionEvent>,
    ) {
        if !state.is_connected() {
            debug!("Ignoring services of '{}', not connected", peripheral.display_name());
            return;
        }
        if state.disconnect_requested {
            debug!("Ignoring services of '{}', disconnecting", peripheral.display_name());
            return;
        }

        let uart = services.iter().find(|s| {
            s.uuid == UART_SERVICE_UUID
                && s.has_characteristic(UART_RX_WRITE_UUID)
                && s.has_characteristic(UART_TX_NOTIFY_UUID)
        });

        let ready = match uart {
            Some(_) => match self.shared.transport.set_notify(UART_NOTIFY, true) {
                Ok(()) => state.set_cli_ready(UART_WRITE, UART_NOTIFY),
                Err(e) => {
                    error!("Failed to enable CLI notifications: {}", e);
                    false
                }
            },
            None => false,
        };

        if ready {
            info!("CLI ready to accept commands");
        } else {
            state.release_characteristics();
            warn!("UART service not available on '{}'", peripheral.display_name());
        }
        emitted.push(SessionEvent::CliReadinessChanged(ready));

        let has_manufacturer = services
            .iter()
            .any(|s| s.uuid == DIS_SERVICE_UUID && s.has_characteristic(MANUFACTURER_NAME_UUID));
        if has_manufacturer {
            if let Err(e) = self.shared.transport.read(MANUFACTURER_NAME) {
                warn!("Failed to request manufacturer name: {}", e);
            }
        }
    }

    fn on_value(
        &self,
        state: &mut SessionState,
        characteristic: CharacteristicRef,
        value: &[u8],
        emitted: &mut Vec<SessionEvent>,
    ) {
        let uuid = characteristic.characteristic;
        if uuid == UART_TX_NOTIFY_UUID {
            let text = decode_notification(value);
            info!("Received notification: {}", text.trim_end());
            state.last_response = text.clone();

            let structured = parse_structured_event(&text);
            emitted.push(SessionEvent::ResponseText(text));
            if let Some(StructuredEvent::ButtonPress(button)) = structured {
                emitted.push(SessionEvent::ButtonPress(button));
            }
        } else if uuid == MANUFACTURER_NAME_UUID {
            let manufacturer = decode_notification(value)
                .trim_end_matches('\0')
                .to_string();
            info!("Received manufacturer: {}", manufacturer);
            state.manufacturer = Some(manufacturer);
        } else {
            debug!("Ignoring value from {}", uuid);
        }
    }

    fn on_disconnected(
        &self,
        state: &mut SessionState,
        peripheral: &PeripheralInfo,
        reason: Option<String>,
        emitted: &mut Vec<SessionEvent>,
    ) {
        match state.connection {
            ConnectionState::Connecting | ConnectionState::Connected => {
                info!(
                    "Disconnected '{}' ({})",
                    peripheral.display_name(),
                    reason.as_deref().unwrap_or("no reason given")
                );
            }
            ConnectionState::Disconnected => {
                debug!("Repeated disconnect from '{}'", peripheral.display_name());
                if !state.disconnect_requested {
                    self.schedule_auto_reconnect(state);
                }
                return;
            }
            ConnectionState::Idle | ConnectionState::Scanning => {
                debug!("Ignoring disconnect while {}", state.connection.as_str());
                return;
            }
        }

        let requested = std::mem::take(&mut state.disconnect_requested);
        let reconnect = !requested || self.shared.settings.reconnect_after_requested_disconnect;
        self.on_link_down(state, emitted, reconnect);
    }

    /// Common handling for a lost or failed link.
    fn on_link_down(
        &self,
        state: &mut SessionState,
        emitted: &mut Vec<SessionEvent>,
        reconnect: bool,
    ) {
        state.set_disconnected();
        emitted.push(SessionEvent::ConnectionChanged(false));
        emitted.push(SessionEvent::CliReadinessChanged(false));
        if reconnect {
            self.schedule_auto_reconnect(state);
        }
    }

    fn schedule_auto_reconnect(&self, state: &mut SessionState) {
        if state.auto_reconnect {
            self.schedule_reconnect(state);
        }
    }

    fn schedule_reconnect(&self, state: &mut SessionState) -> bool {
        let shared = Arc::downgrade(&self.shared);
        state.reconnect.schedule(move |generation| {
            if let Some(shared) = shared.upgrade() {
                DeviceSession { shared }.on_reconnect_timer(generation);
            }
        })
    }

    fn on_reconnect_timer(&self, generation: u64) {
        let mut state = self.shared.state.lock();
        if !state.reconnect.fire(generation) {
            return;
        }
        if state.connection != ConnectionState::Disconnected {
            debug!("Reconnect skipped, session is {}", state.connection.as_str());
            return;
        }
        info!("Attempting reconnect");
        self.begin_scan(&mut state);
    }

    fn begin_scan(&self, state: &mut SessionState) -> bool {
        match self.shared.transport.start_scan() {
            Ok(()) => {
                state.set_scanning();
                info!("Scanning for device");
                true
            }
            Err(e) => {
                error!("Failed to start scan: {}", e);
                state.set_disconnected();
                false
            }
        }
    }

    /// Request a reconnect after the reconnect delay.
    ///
    /// Only effective while disconnected; a no-op when an attempt is already
    /// pending.
    pub fn reconnect(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.connection != ConnectionState::Disconnected {
            debug!("Reconnect ignored while {}", state.connection.as_str());
            return false;
        }
        self.schedule_reconnect(&mut state)
    }

    pub(crate) fn cancel_reconnect(&self) -> bool {
        self.shared.state.lock().reconnect.cancel()
    }

    /// Disconnect from the device.
    ///
    /// An active pattern is stopped first: the worker silences the motors and
    /// resumes the onboard algorithm, the grace delay passes, and only then is
    /// the link torn down. Returns `false` when not connected or when a
    /// disconnect is already underway.
    pub async fn disconnect(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            state.reconnect.cancel();
            if !state.is_connected() {
                debug!("Disconnect ignored while {}", state.connection.as_str());
                return false;
            }
            if state.disconnect_requested {
                debug!("Disconnect already in progress");
                return false;
            }
            state.disconnect_requested = true;
        }

        if self.stop_pattern().await {
            tokio::time::sleep(self.shared.settings.disconnect_grace).await;
        }

        let mut state = self.shared.state.lock();
        let peripheral = match (&state.peripheral, state.is_connected()) {
            (Some(peripheral), true) => peripheral.clone(),
            _ => {
                info!("Link already down, nothing to tear down");
                return false;
            }
        };

        // No command may use the write characteristic from here on.
        state.release_characteristics();
        info!("Disconnecting from '{}'", peripheral.display_name());
        match self.shared.transport.disconnect(&peripheral) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to request disconnect: {}", e);
                state.disconnect_requested = false;
                false
            }
        }
    }

    /// Write commands back to back under one lock so nothing interleaves.
    fn send(&self, commands: &[CliCommand]) -> bool {
        let state = self.shared.state.lock();
        let Some(target) = state.command_target() else {
            debug!(
                "CLI not ready, dropping '{}'",
                commands.first().map(|c| c.name()).unwrap_or_default()
            );
            return false;
        };

        for command in commands {
            if let Err(e) = self.shared.transport.write(target, command.encode()) {
                error!("Failed to queue '{}': {}", command.name(), e);
                return false;
            }
        }
        true
    }

    /// Request developer authorization.
    pub fn send_developer_auth(&self) -> bool {
        self.send(&[CliCommand::DeveloperAuth])
    }

    /// Accept the developer terms; unlocks audio and motor commands.
    pub fn accept_terms(&self) -> bool {
        self.send(&[CliCommand::AcceptTerms])
    }

    pub fn start_audio(&self) -> bool {
        self.send(&[CliCommand::AudioStart])
    }

    /// Stop audio acquisition.
    ///
    /// Always followed by `motors clear_queue`: the firmware requires the pair.
    pub fn stop_audio(&self) -> bool {
        self.send(&[CliCommand::AudioStop, CliCommand::ClearMotorQueue])
    }

    pub fn clear_motor_queue(&self) -> bool {
        self.send(&[CliCommand::ClearMotorQueue])
    }

    /// Start the motor drivers.
    pub fn enable_motors(&self) -> bool {
        self.send(&[CliCommand::EnableMotors])
    }

    /// Shut the motor drivers down. To only silence output, use [`Self::stop_motors`].
    pub fn disable_motors(&self) -> bool {
        self.send(&[CliCommand::DisableMotors])
    }

    /// Set actuator amplitudes; missing trailing entries are zero.
    ///
    /// Frames with more entries than the device has actuators are rejected.
    /// The device holds the last frame until a new one arrives.
    pub fn vibrate_motors(&self, amplitudes: &[u8]) -> bool {
        let motor_count = self.shared.settings.motor_count;
        match MotorFrame::padded(amplitudes, motor_count) {
            Some(frame) => self.send(&[CliCommand::Vibrate(frame)]),
            None => {
                warn!(
                    "Frame of {} amplitudes for a {}-motor device rejected",
                    amplitudes.len(),
                    motor_count
                );
                false
            }
        }
    }

    /// Send an all-zero frame.
    pub fn stop_motors(&self) -> bool {
        self.vibrate_motors(&[])
    }

    pub fn get_battery_level(&self) -> bool {
        self.send(&[CliCommand::BatteryLevel])
    }

    pub fn get_device_info(&self) -> bool {
        self.send(&[CliCommand::DeviceInfo])
    }

    /// Pause the onboard algorithm so the motors accept CLI frames.
    pub fn pause_device_algorithm(&self) -> bool {
        self.send(&[
            CliCommand::AudioStop,
            CliCommand::ClearMotorQueue,
            CliCommand::EnableMotors,
        ])
    }

    /// Hand the motors back to the onboard algorithm.
    pub fn resume_device_algorithm(&self) -> bool {
        self.send(&[CliCommand::AudioStart])
    }

    /// Pause the onboard algorithm and stream frames from `source`.
    ///
    /// Returns `false` if the CLI is not ready or a pattern is already running.
    pub fn start_pattern<S>(&self, source: S) -> bool
    where
        S: FrameSource + 'static,
    {
        let mut slot = self.shared.pattern.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("Pattern already active");
            return false;
        }
        if !self.pause_device_algorithm() {
            return false;
        }

        info!(
            "Starting pattern at {:?} per frame",
            self.shared.settings.frame_interval
        );
        *slot = Some(PatternWorker::spawn(
            self.clone(),
            Box::new(source),
            self.shared.settings.frame_interval,
        ));
        true
    }

    /// Stop the running pattern and wait until the worker has drained.
    ///
    /// Returns `false` if no pattern was running.
    pub async fn stop_pattern(&self) -> bool {
        let handle = self.shared.pattern.lock().take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                info!("Pattern stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_pattern_active(&self) -> bool {
        self.shared
            .pattern
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().is_connected()
    }

    pub fn is_cli_ready(&self) -> bool {
        self.shared.state.lock().cli_ready
    }

    /// Whether a delayed reconnect is waiting to fire.
    pub fn is_reconnect_pending(&self) -> bool {
        self.shared.state.lock().reconnect.is_pending()
    }

    /// Last text received from the device CLI.
    pub fn last_response(&self) -> String {
        self.shared.state.lock().last_response.clone()
    }

    pub fn manufacturer(&self) -> Option<String> {
        self.shared.state.lock().manufacturer.clone()
    }

    pub fn peripheral(&self) -> Option<PeripheralInfo> {
        self.shared.state.lock().peripheral.clone()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.shared.events
    }
}
