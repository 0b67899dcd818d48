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

//! BLE service and characteristic UUIDs exposed by the haptic wristband.

use uuid::Uuid;

/// UART-over-BLE service UUID carrying the device command line.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// UART RX characteristic UUID (we write CLI commands here).
/// Properties: Write
pub const UART_RX_WRITE_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// UART TX characteristic UUID (device sends CLI output here).
/// Properties: Notify
pub const UART_TX_NOTIFY_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Device Information Service UUID.
pub const DIS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);

/// Manufacturer Name String characteristic UUID.
/// Properties: Read
pub const MANUFACTURER_NAME_UUID: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);

/// Session timing and sizing defaults.
pub mod config {
    /// Actuator count of the reference device.
    pub const DEFAULT_MOTOR_COUNT: usize = 4;

    /// Delay before an automatic reconnect attempt.
    pub const RECONNECT_DELAY_MS: u64 = 5000;

    /// Pause between resuming the onboard algorithm and tearing the link down.
    /// Shorter values leave the last motor frame stuck on the device.
    pub const DISCONNECT_GRACE_MS: u64 = 200;

    /// Cadence of streamed motor frames.
    pub const FRAME_INTERVAL_MS: u64 = 150;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            UART_SERVICE_UUID.to_string().to_uppercase(),
            "6E400001-B5A3-F393-E0A9-E50E24DCCA9E"
        );
        assert_eq!(
            UART_RX_WRITE_UUID.to_string().to_uppercase(),
            "6E400002-B5A3-F393-E0A9-E50E24DCCA9E"
        );
        assert_eq!(
            UART_TX_NOTIFY_UUID.to_string().to_uppercase(),
            "6E400003-B5A3-F393-E0A9-E50E24DCCA9E"
        );
        assert_eq!(
            MANUFACTURER_NAME_UUID.to_string(),
            "00002a29-0000-1000-8000-00805f9b34fb"
        );
    }
}
