//! Wired (USB bulk) transport
//!
//! USB printers take print data on a bulk OUT endpoint. Connecting means
//! making sure a configuration is active, finding an interface alternate
//! with such an endpoint and claiming it.

use async_trait::async_trait;

use super::chooser::ChooserResult;
use super::{ConnectOutcome, DisconnectNotifier, PrinterTransport, TransportKind};
use crate::error::{PrintError, PrintResult};

/// Largest chunk handed to a single bulk transfer
pub const WIRED_CHUNK_SIZE: usize = 64 * 1024;

/// USB base class for printers
pub const USB_PRINTER_CLASS: u8 = 0x07;

/// Receipt printers that ship with a vendor-specific class code
pub const KNOWN_PRINTER_IDS: [(u16, u16); 6] = [
    (0x04b8, 0x0202), // Epson TM series
    (0x0416, 0x5011), // Winbond POS58
    (0x0483, 0x5720), // STMicro based 80mm
    (0x0fe6, 0x811e), // ICS Advent
    (0x28e9, 0x0289), // GigaDevice based
    (0x1fc9, 0x2016), // NXP based
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbDeviceFilter {
    Class(u8),
    VendorProduct { vendor_id: u16, product_id: u16 },
}

/// Filter shown to the device chooser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceRequest {
    pub filters: Vec<UsbDeviceFilter>,
}

impl UsbDeviceRequest {
    pub fn printers() -> Self {
        let mut filters = vec![UsbDeviceFilter::Class(USB_PRINTER_CLASS)];
        filters.extend(
            KNOWN_PRINTER_IDS
                .iter()
                .map(|&(vendor_id, product_id)| UsbDeviceFilter::VendorProduct {
                    vendor_id,
                    product_id,
                }),
        );
        Self { filters }
    }

    /// `classes` holds the device class and every interface class
    pub fn matches(&self, vendor_id: u16, product_id: u16, classes: &[u8]) -> bool {
        self.filters.iter().any(|f| match *f {
            UsbDeviceFilter::Class(class) => classes.contains(&class),
            UsbDeviceFilter::VendorProduct {
                vendor_id: v,
                product_id: p,
            } => v == vendor_id && p == product_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointTransfer {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbEndpoint {
    pub address: u8,
    pub direction: EndpointDirection,
    pub transfer: EndpointTransfer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbAlternate {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub class: u8,
    pub endpoints: Vec<UsbEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbConfiguration {
    pub value: u8,
    pub alternates: Vec<UsbAlternate>,
}

/// Interface alternate and endpoint print data goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOutTarget {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub endpoint: u8,
}

/// First interface alternate of `config` with a bulk OUT endpoint
pub fn find_bulk_out(config: &UsbConfiguration) -> Option<BulkOutTarget> {
    config.alternates.iter().find_map(|alt| {
        alt.endpoints
            .iter()
            .find(|ep| {
                ep.direction == EndpointDirection::Out && ep.transfer == EndpointTransfer::Bulk
            })
            .map(|ep| BulkOutTarget {
                interface_number: alt.interface_number,
                alternate_setting: alt.alternate_setting,
                endpoint: ep.address,
            })
    })
}

/// Host side of the USB stack
#[async_trait]
pub trait UsbHost: Send + Sync {
    type Device: UsbDevice;

    fn is_available(&self) -> bool;

    async fn request_device(
        &self,
        request: &UsbDeviceRequest,
    ) -> PrintResult<ChooserResult<Self::Device>>;
}

/// A chosen USB device
#[async_trait]
pub trait UsbDevice: Send + Sync {
    fn name(&self) -> Option<String>;

    async fn open(&mut self) -> PrintResult<()>;

    /// `None` when the device is unconfigured
    async fn active_configuration(&mut self) -> PrintResult<Option<UsbConfiguration>>;

    async fn configurations(&mut self) -> PrintResult<Vec<UsbConfiguration>>;

    async fn select_configuration(&mut self, value: u8) -> PrintResult<()>;

    async fn claim_interface(&mut self, interface_number: u8, alternate_setting: u8)
    -> PrintResult<()>;

    async fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> PrintResult<()>;

    async fn close(&mut self) -> PrintResult<()>;

    fn watch_disconnect(&mut self, notifier: DisconnectNotifier);
}

struct WiredLink<D> {
    device: D,
    target: BulkOutTarget,
    name: String,
}

/// Wired printer transport over any [`UsbHost`]
pub struct WiredTransport<H: UsbHost> {
    host: H,
    link: Option<WiredLink<H::Device>>,
    notifier: Option<DisconnectNotifier>,
    chunk_size: usize,
}

impl<H: UsbHost> WiredTransport<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            link: None,
            notifier: None,
            chunk_size: WIRED_CHUNK_SIZE,
        }
    }

    pub fn target(&self) -> Option<BulkOutTarget> {
        self.link.as_ref().map(|l| l.target)
    }
}

async fn negotiate<D: UsbDevice>(device: &mut D, name: &str) -> PrintResult<BulkOutTarget> {
    device.open().await?;

    let config = match device.active_configuration().await? {
        Some(config) => config,
        None => {
            let first = device
                .configurations()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| PrintError::NoWritableChannel(format!("{}: no configurations", name)))?;
            tracing::debug!(device = %name, value = first.value, "Selecting first configuration");
            device.select_configuration(first.value).await?;
            first
        }
    };

    let target = find_bulk_out(&config)
        .ok_or_else(|| PrintError::NoWritableChannel(format!("{}: no bulk OUT endpoint", name)))?;
    device
        .claim_interface(target.interface_number, target.alternate_setting)
        .await?;
    Ok(target)
}

#[async_trait]
impl<H: UsbHost> PrinterTransport for WiredTransport<H> {
    fn kind(&self) -> TransportKind {
        TransportKind::Wired
    }

    fn is_supported(&self) -> bool {
        self.host.is_available()
    }

    async fn connect(&mut self) -> PrintResult<ConnectOutcome> {
        if !self.is_supported() {
            return Err(PrintError::Unsupported(TransportKind::Wired.to_string()));
        }
        self.disconnect().await?;

        let mut device = match self.host.request_device(&UsbDeviceRequest::printers()).await? {
            ChooserResult::Selected(device) => device,
            ChooserResult::Cancelled => return Ok(ConnectOutcome::Cancelled),
            ChooserResult::NoDevices => {
                return Err(PrintError::Connection("no USB printers attached".to_string()));
            }
        };
        let name = device.name().unwrap_or_else(|| "USB printer".to_string());

        let target = match negotiate(&mut device, &name).await {
            Ok(target) => target,
            Err(e) => {
                if let Err(close_err) = device.close().await {
                    tracing::debug!(error = %close_err, "Close after failed negotiation");
                }
                return Err(e);
            }
        };

        if let Some(notifier) = &self.notifier {
            device.watch_disconnect(notifier.clone());
        }

        tracing::info!(
            device = %name,
            interface = target.interface_number,
            endpoint = format_args!("{:#04x}", target.endpoint),
            "Wired printer connected"
        );
        self.link = Some(WiredLink {
            device,
            target,
            name: name.clone(),
        });
        Ok(ConnectOutcome::Connected { device_name: name })
    }

    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let link = self.link.as_mut().ok_or(PrintError::NotConnected)?;
        let total = data.len().div_ceil(self.chunk_size);

        for (i, chunk) in data.chunks(self.chunk_size).enumerate() {
            link.device
                .transfer_out(link.target.endpoint, chunk)
                .await
                .map_err(|e| PrintError::Write(format!("chunk {}/{}: {}", i + 1, total, e)))?;
        }

        tracing::debug!(bytes = data.len(), chunks = total, "Wired write complete");
        Ok(())
    }

    async fn disconnect(&mut self) -> PrintResult<()> {
        if let Some(mut link) = self.link.take() {
            tracing::info!(device = %link.name, "Disconnecting wired printer");
            link.device.close().await?;
        }
        Ok(())
    }

    fn device_name(&self) -> Option<String> {
        self.link.as_ref().map(|l| l.name.clone())
    }

    fn on_disconnect(&mut self, notifier: DisconnectNotifier) {
        if let Some(link) = self.link.as_mut() {
            link.device.watch_disconnect(notifier.clone());
        }
        self.notifier = Some(notifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        selected: Vec<u8>,
        claimed: Vec<(u8, u8)>,
        transfers: Vec<(u8, Vec<u8>)>,
        closed: usize,
    }

    struct MockDevice {
        active: Option<UsbConfiguration>,
        configurations: Vec<UsbConfiguration>,
        recorder: Arc<Mutex<Recorder>>,
    }

    #[async_trait]
    impl UsbDevice for MockDevice {
        fn name(&self) -> Option<String> {
            Some("TM-T82".to_string())
        }

        async fn open(&mut self) -> PrintResult<()> {
            Ok(())
        }

        async fn active_configuration(&mut self) -> PrintResult<Option<UsbConfiguration>> {
            Ok(self.active.clone())
        }

        async fn configurations(&mut self) -> PrintResult<Vec<UsbConfiguration>> {
            Ok(self.configurations.clone())
        }

        async fn select_configuration(&mut self, value: u8) -> PrintResult<()> {
            self.recorder.lock().unwrap().selected.push(value);
            Ok(())
        }

        async fn claim_interface(&mut self, interface: u8, alternate: u8) -> PrintResult<()> {
            self.recorder.lock().unwrap().claimed.push((interface, alternate));
            Ok(())
        }

        async fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> PrintResult<()> {
            self.recorder
                .lock()
                .unwrap()
                .transfers
                .push((endpoint, data.to_vec()));
            Ok(())
        }

        async fn close(&mut self) -> PrintResult<()> {
            self.recorder.lock().unwrap().closed += 1;
            Ok(())
        }

        fn watch_disconnect(&mut self, _notifier: DisconnectNotifier) {}
    }

    struct MockHost {
        device: Mutex<Option<MockDevice>>,
    }

    #[async_trait]
    impl UsbHost for MockHost {
        type Device = MockDevice;

        fn is_available(&self) -> bool {
            true
        }

        async fn request_device(
            &self,
            request: &UsbDeviceRequest,
        ) -> PrintResult<ChooserResult<MockDevice>> {
            assert!(request.filters.contains(&UsbDeviceFilter::Class(USB_PRINTER_CLASS)));
            Ok(match self.device.lock().unwrap().take() {
                Some(d) => ChooserResult::Selected(d),
                None => ChooserResult::NoDevices,
            })
        }
    }

    fn endpoint(address: u8, direction: EndpointDirection, transfer: EndpointTransfer) -> UsbEndpoint {
        UsbEndpoint {
            address,
            direction,
            transfer,
        }
    }

    fn printer_config(value: u8) -> UsbConfiguration {
        UsbConfiguration {
            value,
            alternates: vec![
                UsbAlternate {
                    interface_number: 0,
                    alternate_setting: 0,
                    class: 0x03,
                    endpoints: vec![endpoint(0x81, EndpointDirection::In, EndpointTransfer::Interrupt)],
                },
                UsbAlternate {
                    interface_number: 1,
                    alternate_setting: 0,
                    class: USB_PRINTER_CLASS,
                    endpoints: vec![
                        endpoint(0x82, EndpointDirection::In, EndpointTransfer::Bulk),
                        endpoint(0x02, EndpointDirection::Out, EndpointTransfer::Bulk),
                    ],
                },
            ],
        }
    }

    fn transport(device: Option<MockDevice>) -> WiredTransport<MockHost> {
        WiredTransport::new(MockHost {
            device: Mutex::new(device),
        })
    }

    #[test]
    fn test_request_matches_class_or_known_ids() {
        let req = UsbDeviceRequest::printers();
        assert!(req.matches(0x1234, 0x0001, &[0x00, USB_PRINTER_CLASS]));
        assert!(req.matches(0x0416, 0x5011, &[0xff]));
        assert!(!req.matches(0x046d, 0xc52b, &[0x03]));
    }

    #[test]
    fn test_find_bulk_out_skips_in_and_interrupt() {
        let target = find_bulk_out(&printer_config(1)).unwrap();
        assert_eq!(
            target,
            BulkOutTarget {
                interface_number: 1,
                alternate_setting: 0,
                endpoint: 0x02
            }
        );
    }

    #[tokio::test]
    async fn test_connect_selects_first_configuration_when_unconfigured() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let device = MockDevice {
            active: None,
            configurations: vec![printer_config(1), printer_config(2)],
            recorder: recorder.clone(),
        };
        let mut t = transport(Some(device));

        let outcome = t.connect().await.unwrap();
        assert_eq!(
            outcome,
            ConnectOutcome::Connected {
                device_name: "TM-T82".to_string()
            }
        );
        let rec = recorder.lock().unwrap();
        assert_eq!(rec.selected, vec![1]);
        assert_eq!(rec.claimed, vec![(1, 0)]);
    }

    #[tokio::test]
    async fn test_connect_keeps_active_configuration() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let device = MockDevice {
            active: Some(printer_config(2)),
            configurations: vec![printer_config(1), printer_config(2)],
            recorder: recorder.clone(),
        };
        let mut t = transport(Some(device));

        t.connect().await.unwrap();
        assert!(recorder.lock().unwrap().selected.is_empty());
    }

    #[tokio::test]
    async fn test_connect_without_bulk_out_fails() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let mut config = printer_config(1);
        config.alternates.truncate(1);
        let device = MockDevice {
            active: Some(config),
            configurations: vec![],
            recorder: recorder.clone(),
        };
        let mut t = transport(Some(device));

        let err = t.connect().await.unwrap_err();
        assert!(matches!(err, PrintError::NoWritableChannel(_)));
        assert_eq!(recorder.lock().unwrap().closed, 1);
        assert!(t.device_name().is_none());
    }

    #[tokio::test]
    async fn test_connect_without_devices_fails() {
        let mut t = transport(None);
        assert!(matches!(
            t.connect().await.unwrap_err(),
            PrintError::Connection(_)
        ));
    }

    #[tokio::test]
    async fn test_write_chunks_reconstruct_stream() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let device = MockDevice {
            active: Some(printer_config(1)),
            configurations: vec![],
            recorder: recorder.clone(),
        };
        let mut t = transport(Some(device));
        t.connect().await.unwrap();

        let data: Vec<u8> = (0..(WIRED_CHUNK_SIZE * 2 + 100)).map(|i| (i % 253) as u8).collect();
        t.write(&data).await.unwrap();

        let rec = recorder.lock().unwrap();
        let sizes: Vec<usize> = rec.transfers.iter().map(|(_, c)| c.len()).collect();
        assert_eq!(sizes, vec![WIRED_CHUNK_SIZE, WIRED_CHUNK_SIZE, 100]);
        assert!(rec.transfers.iter().all(|(ep, _)| *ep == 0x02));
        let joined: Vec<u8> = rec.transfers.iter().flat_map(|(_, c)| c.clone()).collect();
        assert_eq!(joined, data);
    }
}
