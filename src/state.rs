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

//! Session state management.

use std::time::Duration;

use crate::bluetooth::{CharacteristicRef, PeripheralInfo, ReconnectPolicy, ScanFilter};

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Scanning => "Scanning...",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

/// Everything the session knows about its device relationship.
///
/// `cli_ready` is only ever true while `connection` is `Connected`; the
/// mutators below keep it that way.
#[derive(Debug)]
pub struct SessionState {
    /// Current connection status.
    pub connection: ConnectionState,

    /// Whether the device CLI accepts commands.
    pub cli_ready: bool,

    /// Reconnect automatically after an unexpected disconnect.
    pub auto_reconnect: bool,

    /// Last text received from the device CLI.
    pub last_response: String,

    /// How the device is found, reused on every reconnect.
    pub filter: ScanFilter,

    /// Peripheral currently (or last) associated with the session.
    pub peripheral: Option<PeripheralInfo>,

    /// Command characteristic, valid only while connected.
    pub write_characteristic: Option<CharacteristicRef>,

    /// CLI output characteristic, valid only while connected.
    pub notify_characteristic: Option<CharacteristicRef>,

    /// Manufacturer reported by the Device Information Service.
    pub manufacturer: Option<String>,

    /// A local `disconnect()` is in progress.
    pub disconnect_requested: bool,

    /// Delayed reconnect timer.
    pub reconnect: ReconnectPolicy,
}

impl SessionState {
    pub fn new(filter: ScanFilter, auto_reconnect: bool, reconnect_delay: Duration) -> Self {
        Self {
            connection: ConnectionState::Idle,
            cli_ready: false,
            auto_reconnect,
            last_response: String::new(),
            filter,
            peripheral: None,
            write_characteristic: None,
            notify_characteristic: None,
            manufacturer: None,
            disconnect_requested: false,
            reconnect: ReconnectPolicy::new(reconnect_delay),
        }
    }

    pub fn set_scanning(&mut self) {
        self.release_characteristics();
        self.connection = ConnectionState::Scanning;
    }

    pub fn set_connecting(&mut self, peripheral: PeripheralInfo) {
        self.connection = ConnectionState::Connecting;
        self.peripheral = Some(peripheral);
    }

    pub fn set_connected(&mut self, peripheral: PeripheralInfo) {
        self.connection = ConnectionState::Connected;
        self.cli_ready = false;
        self.peripheral = Some(peripheral);
    }

    /// Mark the CLI usable through the given characteristics.
    ///
    /// Ignored unless connected, and once a disconnect has been requested.
    pub fn set_cli_ready(&mut self, write: CharacteristicRef, notify: CharacteristicRef) -> bool {
        if self.connection != ConnectionState::Connected || self.disconnect_requested {
            return false;
        }
        self.write_characteristic = Some(write);
        self.notify_characteristic = Some(notify);
        self.cli_ready = true;
        true
    }

    /// Drop characteristic handles; the CLI is unusable afterwards.
    pub fn release_characteristics(&mut self) {
        self.cli_ready = false;
        self.write_characteristic = None;
        self.notify_characteristic = None;
    }

    pub fn set_disconnected(&mut self) {
        self.release_characteristics();
        self.connection = ConnectionState::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Characteristic to write commands to, when commands may be sent.
    pub fn command_target(&self) -> Option<CharacteristicRef> {
        if self.is_connected() && self.cli_ready {
            self.write_characteristic
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::ble_constants::*;

    fn state() -> SessionState {
        SessionState::new(
            ScanFilter::ByNames(vec!["Buzz".to_string()]),
            true,
            Duration::from_secs(5),
        )
    }

    fn uart(characteristic: uuid::Uuid) -> CharacteristicRef {
        CharacteristicRef::new(UART_SERVICE_UUID, characteristic)
    }

    #[test]
    fn test_ready_requires_connection() {
        let mut state = state();
        assert!(!state.set_cli_ready(uart(UART_RX_WRITE_UUID), uart(UART_TX_NOTIFY_UUID)));
        assert!(!state.cli_ready);

        state.set_connected(PeripheralInfo::new("AA:BB", None));
        assert!(state.set_cli_ready(uart(UART_RX_WRITE_UUID), uart(UART_TX_NOTIFY_UUID)));
        assert_eq!(state.command_target(), Some(uart(UART_RX_WRITE_UUID)));
    }

    #[test]
    fn test_ready_refused_while_disconnecting() {
        let mut state = state();
        state.set_connected(PeripheralInfo::new("AA:BB", None));
        state.disconnect_requested = true;

        assert!(!state.set_cli_ready(uart(UART_RX_WRITE_UUID), uart(UART_TX_NOTIFY_UUID)));
        assert_eq!(state.command_target(), None);
    }

    #[test]
    fn test_disconnect_clears_readiness() {
        let mut state = state();
        state.set_connected(PeripheralInfo::new("AA:BB", None));
        state.set_cli_ready(uart(UART_RX_WRITE_UUID), uart(UART_TX_NOTIFY_UUID));

        state.set_disconnected();
        assert!(!state.cli_ready);
        assert_eq!(state.command_target(), None);
        assert_eq!(state.connection.as_str(), "Disconnected");
        // The peripheral is kept for reconnecting.
        assert!(state.peripheral.is_some());
    }
}
