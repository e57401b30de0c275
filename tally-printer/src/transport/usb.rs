//! USB host backend on top of `nusb`

use async_trait::async_trait;
use futures::StreamExt;
use nusb::hotplug::HotplugEvent;
use nusb::transfer::{Direction, EndpointType};
use nusb::{DeviceInfo, Interface};
use tokio::task::JoinHandle;

use super::chooser::{ChooserResult, DeviceCandidate, DeviceChooser};
use super::wired::{
    EndpointDirection, EndpointTransfer, UsbAlternate, UsbConfiguration, UsbDevice,
    UsbDeviceRequest, UsbEndpoint, UsbHost,
};
use super::DisconnectNotifier;
use crate::error::{PrintError, PrintResult};

fn backend(e: impl std::fmt::Display) -> PrintError {
    PrintError::Backend(e.to_string())
}

fn describe(config: nusb::descriptors::Configuration<'_>) -> UsbConfiguration {
    let alternates = config
        .interface_alt_settings()
        .map(|alt| UsbAlternate {
            interface_number: alt.interface_number(),
            alternate_setting: alt.alternate_setting(),
            class: alt.class(),
            endpoints: alt
                .endpoints()
                .map(|ep| UsbEndpoint {
                    address: ep.address(),
                    direction: match ep.direction() {
                        Direction::In => EndpointDirection::In,
                        Direction::Out => EndpointDirection::Out,
                    },
                    transfer: match ep.transfer_type() {
                        EndpointType::Control => EndpointTransfer::Control,
                        EndpointType::Isochronous => EndpointTransfer::Isochronous,
                        EndpointType::Bulk => EndpointTransfer::Bulk,
                        EndpointType::Interrupt => EndpointTransfer::Interrupt,
                    },
                })
                .collect(),
        })
        .collect();

    UsbConfiguration {
        value: config.configuration_value(),
        alternates,
    }
}

fn device_label(info: &DeviceInfo) -> String {
    info.product_string()
        .map(str::to_string)
        .unwrap_or_else(|| format!("USB {:04x}:{:04x}", info.vendor_id(), info.product_id()))
}

/// Lists attached devices and lets `C` pick one
pub struct NusbHost<C> {
    chooser: C,
}

impl<C: DeviceChooser> NusbHost<C> {
    pub fn new(chooser: C) -> Self {
        Self { chooser }
    }
}

#[async_trait]
impl<C: DeviceChooser> UsbHost for NusbHost<C> {
    type Device = NusbDevice;

    fn is_available(&self) -> bool {
        nusb::list_devices().is_ok()
    }

    async fn request_device(
        &self,
        request: &UsbDeviceRequest,
    ) -> PrintResult<ChooserResult<NusbDevice>> {
        let mut matching: Vec<DeviceInfo> = nusb::list_devices()
            .map_err(backend)?
            .filter(|info| {
                let mut classes = vec![info.class()];
                classes.extend(info.interfaces().map(|i| i.class()));
                request.matches(info.vendor_id(), info.product_id(), &classes)
            })
            .collect();

        if matching.is_empty() {
            return Ok(ChooserResult::NoDevices);
        }

        let candidates: Vec<DeviceCandidate> = matching
            .iter()
            .map(|info| DeviceCandidate {
                id: format!("{}:{}", info.bus_number(), info.device_address()),
                name: Some(device_label(info)),
            })
            .collect();
        tracing::debug!(count = candidates.len(), "USB printer candidates");

        Ok(match self.chooser.choose(&candidates) {
            Some(i) if i < matching.len() => {
                ChooserResult::Selected(NusbDevice::new(matching.swap_remove(i)))
            }
            _ => ChooserResult::Cancelled,
        })
    }
}

pub struct NusbDevice {
    info: DeviceInfo,
    device: Option<nusb::Device>,
    interface: Option<Interface>,
    watcher: Option<JoinHandle<()>>,
}

impl NusbDevice {
    fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            device: None,
            interface: None,
            watcher: None,
        }
    }

    fn device(&self) -> PrintResult<&nusb::Device> {
        self.device.as_ref().ok_or(PrintError::NotConnected)
    }
}

#[async_trait]
impl UsbDevice for NusbDevice {
    fn name(&self) -> Option<String> {
        Some(device_label(&self.info))
    }

    async fn open(&mut self) -> PrintResult<()> {
        let device = self
            .info
            .open()
            .map_err(|e| PrintError::Connection(e.to_string()))?;
        self.device = Some(device);
        Ok(())
    }

    async fn active_configuration(&mut self) -> PrintResult<Option<UsbConfiguration>> {
        Ok(self.device()?.active_configuration().ok().map(describe))
    }

    async fn configurations(&mut self) -> PrintResult<Vec<UsbConfiguration>> {
        Ok(self.device()?.configurations().map(describe).collect())
    }

    async fn select_configuration(&mut self, value: u8) -> PrintResult<()> {
        self.device()?.set_configuration(value).map_err(backend)
    }

    async fn claim_interface(&mut self, interface_number: u8, alternate_setting: u8) -> PrintResult<()> {
        let interface = self
            .device()?
            .claim_interface(interface_number)
            .map_err(|e| PrintError::Connection(format!("claim interface {}: {}", interface_number, e)))?;
        if alternate_setting != 0 {
            interface.set_alt_setting(alternate_setting).map_err(backend)?;
        }
        self.interface = Some(interface);
        Ok(())
    }

    async fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> PrintResult<()> {
        let interface = self.interface.as_ref().ok_or(PrintError::NotConnected)?;
        interface
            .bulk_out(endpoint, data.to_vec())
            .await
            .into_result()
            .map(|_| ())
            .map_err(backend)
    }

    async fn close(&mut self) -> PrintResult<()> {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.interface = None;
        self.device = None;
        Ok(())
    }

    fn watch_disconnect(&mut self, notifier: DisconnectNotifier) {
        let mut watch = match nusb::watch_devices() {
            Ok(watch) => watch,
            Err(e) => {
                tracing::warn!(error = %e, "USB hotplug watch unavailable");
                return;
            }
        };
        let id = self.info.id();
        let name = self.name();

        if let Some(old) = self.watcher.take() {
            old.abort();
        }
        self.watcher = Some(tokio::spawn(async move {
            while let Some(event) = watch.next().await {
                if notifier.is_closed() {
                    break;
                }
                if let HotplugEvent::Disconnected(gone) = event
                    && gone == id
                {
                    notifier.notify(name, "USB device unplugged");
                    break;
                }
            }
        }));
    }
}
