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

//! Transport abstraction between the session state machine and a BLE stack.
//!
//! Requests are submitted without waiting for the radio. Their outcomes come
//! back, in order, as [`TransportEvent`]s on the channel handed out when the
//! transport was created.

use anyhow::Result;
use uuid::Uuid;

/// A peripheral seen during scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralInfo {
    /// Bluetooth address, e.g. `EB:CA:85:38:19:1D`.
    pub address: String,
    /// Advertised name, if any.
    pub name: Option<String>,
}

impl PeripheralInfo {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Name for log output.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// Which peripheral to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    /// First device whose name contains any of these fragments.
    ByNames(Vec<String>),
    /// The device with exactly this address (case-insensitive).
    ByAddress(String),
}

impl ScanFilter {
    /// Check whether a discovered peripheral satisfies the filter.
    pub fn matches(&self, peripheral: &PeripheralInfo) -> bool {
        match self {
            ScanFilter::ByNames(names) => peripheral
                .name
                .as_deref()
                .map(|name| names.iter().any(|n| !n.is_empty() && name.contains(n.as_str())))
                .unwrap_or(false),
            ScanFilter::ByAddress(address) => peripheral.address.eq_ignore_ascii_case(address),
        }
    }
}

/// A discovered GATT service with its characteristic UUIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

impl GattService {
    pub fn has_characteristic(&self, uuid: Uuid) -> bool {
        self.characteristics.contains(&uuid)
    }
}

/// Addresses one characteristic on the connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicRef {
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

/// Results reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A peripheral showed up while scanning.
    Discovered(PeripheralInfo),
    /// The link to a peripheral is up.
    Connected(PeripheralInfo),
    /// A connection attempt failed.
    ConnectionFailed {
        peripheral: PeripheralInfo,
        reason: String,
    },
    /// Service discovery finished.
    ServicesDiscovered {
        peripheral: PeripheralInfo,
        services: Vec<GattService>,
    },
    /// Notifications were switched on or off (or failed to).
    NotificationStateChanged {
        characteristic: CharacteristicRef,
        enabled: bool,
        error: Option<String>,
    },
    /// A notification arrived or a read completed.
    CharacteristicValue {
        characteristic: CharacteristicRef,
        value: Vec<u8>,
    },
    /// A write finished.
    WriteComplete {
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        error: Option<String>,
    },
    /// The link went down, for whatever reason.
    Disconnected {
        peripheral: PeripheralInfo,
        reason: Option<String>,
    },
}

/// A BLE central capable of driving one peripheral.
///
/// Every method only queues the request. An `Err` means the request could not
/// be queued at all (for example the backend has shut down); radio-level
/// failures are reported through [`TransportEvent`]s instead.
pub trait Transport: Send + Sync {
    /// Get the backend name (e.g., "BlueZ").
    fn backend_name(&self) -> &'static str;

    /// Start reporting nearby peripherals as [`TransportEvent::Discovered`].
    fn start_scan(&self) -> Result<()>;

    /// Stop scanning.
    fn stop_scan(&self) -> Result<()>;

    /// Connect to a previously discovered peripheral.
    fn connect(&self, peripheral: &PeripheralInfo) -> Result<()>;

    /// Resolve services on a connected peripheral.
    fn discover_services(&self, peripheral: &PeripheralInfo) -> Result<()>;

    /// Switch notifications for a characteristic on or off.
    fn set_notify(&self, characteristic: CharacteristicRef, enable: bool) -> Result<()>;

    /// Write a value with response.
    fn write(&self, characteristic: CharacteristicRef, value: Vec<u8>) -> Result<()>;

    /// Read a value once.
    fn read(&self, characteristic: CharacteristicRef) -> Result<()>;

    /// Tear the link down.
    fn disconnect(&self, peripheral: &PeripheralInfo) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_filter() {
        let filter = ScanFilter::ByNames(vec!["Buzz".to_string(), "Wristband".to_string()]);
        assert!(filter.matches(&PeripheralInfo::new("AA:BB", Some("Buzz 1234".into()))));
        assert!(filter.matches(&PeripheralInfo::new("AA:BB", Some("My Wristband".into()))));
        assert!(!filter.matches(&PeripheralInfo::new("AA:BB", Some("Headphones".into()))));
        assert!(!filter.matches(&PeripheralInfo::new("AA:BB", None)));
    }

    #[test]
    fn test_empty_name_fragment_never_matches() {
        let filter = ScanFilter::ByNames(vec![String::new()]);
        assert!(!filter.matches(&PeripheralInfo::new("AA:BB", Some("Anything".into()))));
    }

    #[test]
    fn test_address_filter() {
        let filter = ScanFilter::ByAddress("eb:ca:85:38:19:1d".to_string());
        assert!(filter.matches(&PeripheralInfo::new("EB:CA:85:38:19:1D", None)));
        assert!(!filter.matches(&PeripheralInfo::new("EB:CA:85:38:19:1E", Some("Buzz".into()))));
    }
}
