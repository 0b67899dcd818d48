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

//! Shared fixtures: a transport that records requests instead of using a radio.

#![allow(dead_code)]

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use buzzlink::bluetooth::ble_constants::*;
use buzzlink::bluetooth::{
    CharacteristicRef, DeviceSession, GattService, PeripheralInfo, ScanFilter, SessionHost,
    SessionSettings, Transport, TransportEvent,
};
use buzzlink::events::SessionEvent;

pub const ADDRESS: &str = "EB:CA:85:38:19:1D";

pub const UART_WRITE: CharacteristicRef =
    CharacteristicRef::new(UART_SERVICE_UUID, UART_RX_WRITE_UUID);
pub const UART_NOTIFY: CharacteristicRef =
    CharacteristicRef::new(UART_SERVICE_UUID, UART_TX_NOTIFY_UUID);
pub const MANUFACTURER: CharacteristicRef =
    CharacteristicRef::new(DIS_SERVICE_UUID, MANUFACTURER_NAME_UUID);

/// A request made to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(String),
    DiscoverServices,
    SetNotify(CharacteristicRef, bool),
    Write(String),
    Read(CharacteristicRef),
    Disconnect,
}

#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().push((Instant::now(), call));
        Ok(())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().clone()
    }

    /// Written lines, in order.
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl Transport for RecordingTransport {
    fn backend_name(&self) -> &'static str {
        "Recording"
    }

    fn start_scan(&self) -> Result<()> {
        self.record(Call::StartScan)
    }

    fn stop_scan(&self) -> Result<()> {
        self.record(Call::StopScan)
    }

    fn connect(&self, peripheral: &PeripheralInfo) -> Result<()> {
        self.record(Call::Connect(peripheral.address.clone()))
    }

    fn discover_services(&self, _peripheral: &PeripheralInfo) -> Result<()> {
        self.record(Call::DiscoverServices)
    }

    fn set_notify(&self, characteristic: CharacteristicRef, enable: bool) -> Result<()> {
        self.record(Call::SetNotify(characteristic, enable))
    }

    fn write(&self, _characteristic: CharacteristicRef, value: Vec<u8>) -> Result<()> {
        self.record(Call::Write(String::from_utf8_lossy(&value).into_owned()))
    }

    fn read(&self, characteristic: CharacteristicRef) -> Result<()> {
        self.record(Call::Read(characteristic))
    }

    fn disconnect(&self, _peripheral: &PeripheralInfo) -> Result<()> {
        self.record(Call::Disconnect)
    }
}

pub fn peripheral() -> PeripheralInfo {
    PeripheralInfo::new(ADDRESS, Some("Buzz 0F3A".to_string()))
}

pub fn uart_service() -> GattService {
    GattService {
        uuid: UART_SERVICE_UUID,
        characteristics: vec![UART_RX_WRITE_UUID, UART_TX_NOTIFY_UUID],
    }
}

pub fn device_info_service() -> GattService {
    GattService {
        uuid: DIS_SERVICE_UUID,
        characteristics: vec![MANUFACTURER_NAME_UUID],
    }
}

pub fn name_filter() -> ScanFilter {
    ScanFilter::ByNames(vec!["Buzz".to_string()])
}

/// A host over a recording transport. The sender feeds the host's event pump.
pub fn host(
    transport: &Arc<RecordingTransport>,
) -> (SessionHost, mpsc::Sender<TransportEvent>) {
    let (tx, rx) = mpsc::channel(32);
    let host = SessionHost::new(transport.clone(), rx, SessionSettings::default());
    (host, tx)
}

/// Drive a started session to connected, with the given services.
pub fn connect_with(session: &DeviceSession, services: Vec<GattService>) {
    session.handle_event(TransportEvent::Discovered(peripheral()));
    session.handle_event(TransportEvent::Connected(peripheral()));
    session.handle_event(TransportEvent::ServicesDiscovered {
        peripheral: peripheral(),
        services,
    });
}

/// Drive a started session to connected and CLI-ready.
pub fn connect_ready(session: &DeviceSession) {
    connect_with(session, vec![uart_service()]);
}

pub fn peer_disconnect(session: &DeviceSession) {
    session.handle_event(TransportEvent::Disconnected {
        peripheral: peripheral(),
        reason: Some("link lost".to_string()),
    });
}

/// Events received so far, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
