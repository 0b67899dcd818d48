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

//! BLE central on BlueZ.
//!
//! A single driver task owns the adapter and the connected device and works
//! through queued requests in order. Scanning, notification streams and link
//! monitoring run as child tasks that feed the same event channel.

use anyhow::{anyhow, Result};
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty};
use futures::{pin_mut, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::transport::{CharacteristicRef, GattService, PeripheralInfo, Transport, TransportEvent};

/// Polls for BlueZ to finish resolving services after connecting.
const SERVICE_RESOLVE_POLL: Duration = Duration::from_millis(100);
const SERVICE_RESOLVE_ATTEMPTS: u32 = 50;

#[derive(Debug)]
enum Request {
    StartScan,
    StopScan,
    Connect(PeripheralInfo),
    DiscoverServices(PeripheralInfo),
    SetNotify(CharacteristicRef, bool),
    Write(CharacteristicRef, Vec<u8>),
    Read(CharacteristicRef),
    Disconnect(PeripheralInfo),
}

/// Requests waiting for the driver; frames beyond this are dropped.
const REQUEST_QUEUE_DEPTH: usize = 64;

/// [`Transport`] backed by the BlueZ D-Bus API.
pub struct BluerTransport {
    requests: mpsc::Sender<Request>,
}

impl BluerTransport {
    /// Open the adapter (the default one unless `adapter_name` is given) and
    /// start the driver task.
    pub async fn new(
        adapter_name: Option<&str>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        info!("Initializing BLE central...");

        // Create BlueZ session
        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = match adapter_name {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        info!("Using Bluetooth adapter: {}", adapter.name());

        // Ensure adapter is powered on
        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let driver = CentralDriver::new(adapter, event_tx);
        tokio::spawn(driver.run(request_rx));

        Ok((
            Self {
                requests: request_tx,
            },
            event_rx,
        ))
    }

    fn submit(&self, request: Request) -> Result<()> {
        match self.requests.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(request)) => {
                warn!("BLE request queue full, dropping {:?}", request);
                Err(anyhow!("BLE request queue full, dropped {:?}", request))
            }
            Err(TrySendError::Closed(request)) => {
                Err(anyhow!("BLE driver has stopped, dropped {:?}", request))
            }
        }
    }
}

impl Transport for BluerTransport {
    fn backend_name(&self) -> &'static str {
        "BlueZ"
    }

    fn start_scan(&self) -> Result<()> {
        self.submit(Request::StartScan)
    }

    fn stop_scan(&self) -> Result<()> {
        self.submit(Request::StopScan)
    }

    fn connect(&self, peripheral: &PeripheralInfo) -> Result<()> {
        self.submit(Request::Connect(peripheral.clone()))
    }

    fn discover_services(&self, peripheral: &PeripheralInfo) -> Result<()> {
        self.submit(Request::DiscoverServices(peripheral.clone()))
    }

    fn set_notify(&self, characteristic: CharacteristicRef, enable: bool) -> Result<()> {
        self.submit(Request::SetNotify(characteristic, enable))
    }

    fn write(&self, characteristic: CharacteristicRef, value: Vec<u8>) -> Result<()> {
        self.submit(Request::Write(characteristic, value))
    }

    fn read(&self, characteristic: CharacteristicRef) -> Result<()> {
        self.submit(Request::Read(characteristic))
    }

    fn disconnect(&self, peripheral: &PeripheralInfo) -> Result<()> {
        self.submit(Request::Disconnect(peripheral.clone()))
    }
}

struct CentralDriver {
    adapter: Adapter,
    event_tx: mpsc::Sender<TransportEvent>,
    device: Option<Device>,
    characteristics: HashMap<CharacteristicRef, Characteristic>,
    scan_task: Option<JoinHandle<()>>,
    monitor_task: Option<JoinHandle<()>>,
    notify_tasks: HashMap<CharacteristicRef, JoinHandle<()>>,
}

impl CentralDriver {
    fn new(adapter: Adapter, event_tx: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            adapter,
            event_tx,
            device: None,
            characteristics: HashMap::new(),
            scan_task: None,
            monitor_task: None,
            notify_tasks: HashMap::new(),
        }
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        while let Some(request) = requests.recv().await {
            debug!("BLE request: {:?}", request);
            if let Err(e) = self.handle(request).await {
                error!("BLE request failed: {}", e);
            }
        }

        info!("BLE driver stopping");
        self.stop_scan();
        self.release_device();
    }

    async fn handle(&mut self, request: Request) -> Result<()> {
        match request {
            Request::StartScan => {
                self.start_scan();
                Ok(())
            }
            Request::StopScan => {
                self.stop_scan();
                Ok(())
            }
            Request::Connect(peripheral) => self.connect(peripheral).await,
            Request::DiscoverServices(peripheral) => self.discover_services(peripheral).await,
            Request::SetNotify(characteristic, enable) => self.set_notify(characteristic, enable),
            Request::Write(characteristic, value) => self.write(characteristic, value).await,
            Request::Read(characteristic) => self.read(characteristic).await,
            Request::Disconnect(peripheral) => self.disconnect(peripheral).await,
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if let Err(e) = self.event_tx.send(event).await {
            error!("Failed to send transport event: {}", e);
        }
    }

    fn start_scan(&mut self) {
        self.stop_scan();

        let adapter = self.adapter.clone();
        let event_tx = self.event_tx.clone();
        self.scan_task = Some(tokio::spawn(async move {
            let events = match adapter.discover_devices().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to start discovery: {}", e);
                    return;
                }
            };
            pin_mut!(events);
            info!("Discovery started");

            while let Some(event) = events.next().await {
                let AdapterEvent::DeviceAdded(address) = event else {
                    continue;
                };
                let name = match adapter.device(address) {
                    Ok(device) => device.name().await.ok().flatten(),
                    Err(_) => None,
                };
                let peripheral = PeripheralInfo::new(address.to_string(), name);
                if event_tx.send(TransportEvent::Discovered(peripheral)).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_scan(&mut self) {
        // Dropping the discovery stream ends discovery in BlueZ.
        if let Some(task) = self.scan_task.take() {
            task.abort();
            info!("Discovery stopped");
        }
    }

    async fn connect(&mut self, peripheral: PeripheralInfo) -> Result<()> {
        self.release_device();

        let address: Address = peripheral
            .address
            .parse()
            .map_err(|_| anyhow!("Invalid Bluetooth address '{}'", peripheral.address))?;
        let device = self.adapter.device(address)?;

        info!("Connecting to '{}'...", peripheral.display_name());
        match device.connect().await {
            Ok(()) => {
                self.monitor_link(device.clone(), peripheral.clone());
                self.device = Some(device);
                self.emit(TransportEvent::Connected(peripheral)).await;
            }
            Err(e) => {
                self.emit(TransportEvent::ConnectionFailed {
                    peripheral,
                    reason: e.to_string(),
                })
                .await;
            }
        }
        Ok(())
    }

    /// Report the link going down without a local request.
    fn monitor_link(&mut self, device: Device, peripheral: PeripheralInfo) {
        let event_tx = self.event_tx.clone();
        self.monitor_task = Some(tokio::spawn(async move {
            let events = match device.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Cannot monitor device events: {}", e);
                    return;
                }
            };
            pin_mut!(events);

            while let Some(event) = events.next().await {
                if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                    let _ = event_tx
                        .send(TransportEvent::Disconnected {
                            peripheral,
                            reason: Some("link lost".to_string()),
                        })
                        .await;
                    break;
                }
            }
        }));
    }

    async fn discover_services(&mut self, peripheral: PeripheralInfo) -> Result<()> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| anyhow!("Service discovery without a connected device"))?;

        let mut attempts = 0;
        while !device.is_services_resolved().await? {
            attempts += 1;
            if attempts >= SERVICE_RESOLVE_ATTEMPTS {
                warn!("Services not resolved, using what is available");
                break;
            }
            tokio::time::sleep(SERVICE_RESOLVE_POLL).await;
        }

        self.characteristics.clear();
        let mut services = Vec::new();
        for service in device.services().await? {
            let service_uuid = service.uuid().await?;
            let mut uuids = Vec::new();
            for characteristic in service.characteristics().await? {
                let uuid = characteristic.uuid().await?;
                self.characteristics
                    .insert(CharacteristicRef::new(service_uuid, uuid), characteristic);
                uuids.push(uuid);
            }
            debug!("Service {} with {} characteristics", service_uuid, uuids.len());
            services.push(GattService {
                uuid: service_uuid,
                characteristics: uuids,
            });
        }

        self.emit(TransportEvent::ServicesDiscovered {
            peripheral,
            services,
        })
        .await;
        Ok(())
    }

    fn characteristic(&self, target: CharacteristicRef) -> Result<Characteristic> {
        self.characteristics
            .get(&target)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown characteristic {}", target.characteristic))
    }

    fn set_notify(&mut self, target: CharacteristicRef, enable: bool) -> Result<()> {
        if let Some(task) = self.notify_tasks.remove(&target) {
            task.abort();
        }

        let event_tx = self.event_tx.clone();
        if !enable {
            tokio::spawn(async move {
                let _ = event_tx
                    .send(TransportEvent::NotificationStateChanged {
                        characteristic: target,
                        enabled: false,
                        error: None,
                    })
                    .await;
            });
            return Ok(());
        }

        let characteristic = self.characteristic(target)?;
        let task = tokio::spawn(async move {
            let values = match characteristic.notify().await {
                Ok(values) => values,
                Err(e) => {
                    let _ = event_tx
                        .send(TransportEvent::NotificationStateChanged {
                            characteristic: target,
                            enabled: false,
                            error: Some(e.to_string()),
                        })
                        .await;
                    return;
                }
            };
            pin_mut!(values);

            let enabled = TransportEvent::NotificationStateChanged {
                characteristic: target,
                enabled: true,
                error: None,
            };
            if event_tx.send(enabled).await.is_err() {
                return;
            }

            while let Some(value) = values.next().await {
                let event = TransportEvent::CharacteristicValue {
                    characteristic: target,
                    value,
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!("Notification stream for {} ended", target.characteristic);
        });
        self.notify_tasks.insert(target, task);
        Ok(())
    }

    async fn write(&mut self, target: CharacteristicRef, value: Vec<u8>) -> Result<()> {
        let characteristic = self.characteristic(target)?;
        let result = characteristic.write(&value).await;
        self.emit(TransportEvent::WriteComplete {
            characteristic: target,
            value,
            error: result.err().map(|e| e.to_string()),
        })
        .await;
        Ok(())
    }

    async fn read(&mut self, target: CharacteristicRef) -> Result<()> {
        let characteristic = self.characteristic(target)?;
        let value = characteristic.read().await?;
        self.emit(TransportEvent::CharacteristicValue {
            characteristic: target,
            value,
        })
        .await;
        Ok(())
    }

    async fn disconnect(&mut self, peripheral: PeripheralInfo) -> Result<()> {
        // The monitor would report this disconnect a second time.
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
        let device = self.device.clone();
        self.release_device();

        let reason = match device {
            Some(device) => device.disconnect().await.err().map(|e| e.to_string()),
            None => Some("no device connected".to_string()),
        };
        if let Some(reason) = &reason {
            warn!("Disconnect from '{}': {}", peripheral.display_name(), reason);
        }

        self.emit(TransportEvent::Disconnected { peripheral, reason })
            .await;
        Ok(())
    }

    fn release_device(&mut self) {
        for (_, task) in self.notify_tasks.drain() {
            task.abort();
        }
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
        self.characteristics.clear();
        self.device = None;
    }
}
