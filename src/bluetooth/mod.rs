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

//! Bluetooth communication module.
//!
//! Connects as a BLE central to a haptic wristband and drives its text CLI
//! over the Nordic UART service.

pub mod ble_constants;
mod central;
mod host;
pub mod protocol;
mod reconnect;
mod session;
mod transport;

pub use central::BluerTransport;
pub use host::SessionHost;
pub use protocol::{CliCommand, MotorFrame, StructuredEvent};
pub use reconnect::ReconnectPolicy;
pub use session::{DeviceSession, SessionSettings};
pub use transport::{
    CharacteristicRef, GattService, PeripheralInfo, ScanFilter, Transport, TransportEvent,
};
