//! Bluetooth LE backend on top of `btleplug`

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::chooser::{ChooserResult, DeviceCandidate, DeviceChooser};
use super::wireless::{
    CharacteristicProperties, GattCentral, GattCharacteristic, GattDeviceRequest,
    GattPeripheral, GattService, WriteMode,
};
use super::DisconnectNotifier;
use crate::error::{PrintError, PrintResult};

/// How long to listen for advertisements before presenting candidates
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(4);

fn backend(e: btleplug::Error) -> PrintError {
    PrintError::Backend(e.to_string())
}

/// First local Bluetooth adapter plus a chooser
pub struct BleCentral<C> {
    adapter: Option<Adapter>,
    chooser: C,
    scan_window: Duration,
}

impl<C: DeviceChooser> BleCentral<C> {
    /// Binds to the first adapter; a host without one reports unsupported
    pub async fn new(chooser: C) -> PrintResult<Self> {
        let manager = Manager::new().await.map_err(backend)?;
        let adapter = manager.adapters().await.map_err(backend)?.into_iter().next();
        if adapter.is_none() {
            tracing::warn!("No Bluetooth adapter found");
        }
        Ok(Self {
            adapter,
            chooser,
            scan_window: DEFAULT_SCAN_WINDOW,
        })
    }

    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }
}

#[async_trait]
impl<C: DeviceChooser> GattCentral for BleCentral<C> {
    type Peripheral = BlePeripheral;

    fn is_available(&self) -> bool {
        self.adapter.is_some()
    }

    async fn request_device(
        &self,
        request: &GattDeviceRequest,
    ) -> PrintResult<ChooserResult<BlePeripheral>> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or_else(|| PrintError::Unsupported("no Bluetooth adapter".to_string()))?;

        let filter = ScanFilter {
            services: if request.accept_all_devices {
                Vec::new()
            } else {
                request.services.clone()
            },
        };
        adapter.start_scan(filter).await.map_err(backend)?;
        tokio::time::sleep(self.scan_window).await;
        adapter.stop_scan().await.map_err(backend)?;

        let mut matching = Vec::new();
        for peripheral in adapter.peripherals().await.map_err(backend)? {
            let Some(props) = peripheral.properties().await.map_err(backend)? else {
                continue;
            };
            if request.matches(&props.services) {
                matching.push((peripheral, props.local_name));
            }
        }

        if matching.is_empty() {
            return Ok(ChooserResult::NoDevices);
        }

        let candidates: Vec<DeviceCandidate> = matching
            .iter()
            .map(|(p, name)| DeviceCandidate {
                id: p.address().to_string(),
                name: name.clone(),
            })
            .collect();
        tracing::debug!(count = candidates.len(), "Bluetooth printer candidates");

        Ok(match self.chooser.choose(&candidates) {
            Some(i) if i < matching.len() => {
                let (peripheral, name) = matching.swap_remove(i);
                ChooserResult::Selected(BlePeripheral {
                    peripheral,
                    adapter: adapter.clone(),
                    name,
                    characteristics: Vec::new(),
                    watcher: None,
                })
            }
            _ => ChooserResult::Cancelled,
        })
    }
}

pub struct BlePeripheral {
    peripheral: Peripheral,
    adapter: Adapter,
    name: Option<String>,
    characteristics: Vec<Characteristic>,
    watcher: Option<JoinHandle<()>>,
}

#[async_trait]
impl GattPeripheral for BlePeripheral {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn open(&mut self) -> PrintResult<()> {
        self.peripheral
            .connect()
            .await
            .map_err(|e| PrintError::Connection(e.to_string()))?;
        self.peripheral.discover_services().await.map_err(backend)
    }

    async fn services(&mut self) -> PrintResult<Vec<GattService>> {
        let services = self.peripheral.services();
        self.characteristics = services
            .iter()
            .flat_map(|s| s.characteristics.iter().cloned())
            .collect();

        Ok(services
            .into_iter()
            .map(|s| GattService {
                uuid: s.uuid,
                characteristics: s
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        service: c.service_uuid,
                        uuid: c.uuid,
                        properties: CharacteristicProperties {
                            write: c.properties.contains(CharPropFlags::WRITE),
                            write_without_response: c
                                .properties
                                .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
                        },
                    })
                    .collect(),
            })
            .collect())
    }

    async fn write(
        &mut self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> PrintResult<()> {
        let target = self
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
            .ok_or_else(|| PrintError::NoWritableChannel(characteristic.uuid.to_string()))?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(target, data, write_type)
            .await
            .map_err(backend)
    }

    async fn close(&mut self) -> PrintResult<()> {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.characteristics.clear();
        self.peripheral.disconnect().await.map_err(backend)
    }

    fn watch_disconnect(&mut self, notifier: DisconnectNotifier) {
        let adapter = self.adapter.clone();
        let id = self.peripheral.id();
        let name = self.name.clone();

        if let Some(old) = self.watcher.take() {
            old.abort();
        }
        self.watcher = Some(tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(error = %e, "Bluetooth event stream unavailable");
                    return;
                }
            };
            while let Some(event) = events.next().await {
                if notifier.is_closed() {
                    break;
                }
                if let CentralEvent::DeviceDisconnected(gone) = event
                    && gone == id
                {
                    notifier.notify(name, "Bluetooth link lost");
                    break;
                }
            }
        }));
    }
}
