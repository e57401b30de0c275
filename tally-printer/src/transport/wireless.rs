//! Wireless (GATT) transport
//!
//! A printer exposes one or more GATT services; printing means finding a
//! characteristic that accepts writes and streaming the command bytes to
//! it in MTU-sized chunks.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::chooser::ChooserResult;
use super::{ConnectOutcome, DisconnectNotifier, PrinterTransport, TransportKind};
use crate::error::{PrintError, PrintResult};

/// Largest chunk handed to a single characteristic write
pub const WIRELESS_CHUNK_SIZE: usize = 512;

/// Pause between consecutive chunks so the printer buffer can drain
pub const WIRELESS_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Services advertised by common thermal printers, in probe order
pub const KNOWN_PRINTER_SERVICES: [Uuid; 5] = [
    Uuid::from_u128(0x000018f0_0000_1000_8000_00805f9b34fb),
    Uuid::from_u128(0xe7810a71_73ae_499d_8c15_faa9aef0c3f2),
    Uuid::from_u128(0x49535343_fe7d_4ae5_8fa9_9fafd205e455),
    Uuid::from_u128(0x0000ff00_0000_1000_8000_00805f9b34fb),
    Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb),
];

/// Write characteristics paired with the services above
pub const KNOWN_WRITE_CHARACTERISTICS: [Uuid; 5] = [
    Uuid::from_u128(0x00002af1_0000_1000_8000_00805f9b34fb),
    Uuid::from_u128(0xbef8d6c9_9c21_4c9e_b632_bd58c1009f9f),
    Uuid::from_u128(0x49535343_8841_43f4_a8d4_ecbe34729bb3),
    Uuid::from_u128(0x0000ff02_0000_1000_8000_00805f9b34fb),
    Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub write: bool,
    pub write_without_response: bool,
}

impl CharacteristicProperties {
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub service: Uuid,
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

impl GattCharacteristic {
    /// Acknowledged writes unless the characteristic only takes unacknowledged ones
    pub fn write_mode(&self) -> WriteMode {
        if self.properties.write {
            WriteMode::WithResponse
        } else {
            WriteMode::WithoutResponse
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// Filter shown to the device chooser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattDeviceRequest {
    pub services: Vec<Uuid>,
    pub accept_all_devices: bool,
}

impl GattDeviceRequest {
    pub fn known_printers() -> Self {
        Self {
            services: KNOWN_PRINTER_SERVICES.to_vec(),
            accept_all_devices: false,
        }
    }

    /// Every nearby device; still lists the known services so they stay accessible
    pub fn any_device() -> Self {
        Self {
            services: KNOWN_PRINTER_SERVICES.to_vec(),
            accept_all_devices: true,
        }
    }

    pub fn matches(&self, advertised: &[Uuid]) -> bool {
        self.accept_all_devices || advertised.iter().any(|s| self.services.contains(s))
    }
}

/// Host side of the wireless stack
#[async_trait]
pub trait GattCentral: Send + Sync {
    type Peripheral: GattPeripheral;

    fn is_available(&self) -> bool;

    /// Present the chooser for devices matching `request`
    async fn request_device(
        &self,
        request: &GattDeviceRequest,
    ) -> PrintResult<ChooserResult<Self::Peripheral>>;
}

/// A chosen wireless device
#[async_trait]
pub trait GattPeripheral: Send + Sync {
    fn name(&self) -> Option<String>;

    async fn open(&mut self) -> PrintResult<()>;

    async fn services(&mut self) -> PrintResult<Vec<GattService>>;

    async fn write(
        &mut self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> PrintResult<()>;

    async fn close(&mut self) -> PrintResult<()>;

    /// Report out-of-band loss of the link to `notifier`
    fn watch_disconnect(&mut self, notifier: DisconnectNotifier);
}

/// Find the characteristic to stream print data to
///
/// Probe order:
/// 1. each known service, its known write characteristics
/// 2. the same service, any writable characteristic
/// 3. every service on the device, any writable characteristic
pub fn select_write_channel(services: &[GattService]) -> Option<GattCharacteristic> {
    for known in KNOWN_PRINTER_SERVICES {
        let Some(service) = services.iter().find(|s| s.uuid == known) else {
            continue;
        };

        let by_uuid = KNOWN_WRITE_CHARACTERISTICS.iter().find_map(|uuid| {
            service
                .characteristics
                .iter()
                .find(|c| c.uuid == *uuid && c.properties.is_writable())
        });
        if let Some(c) = by_uuid {
            return Some(c.clone());
        }

        if let Some(c) = service
            .characteristics
            .iter()
            .find(|c| c.properties.is_writable())
        {
            return Some(c.clone());
        }
    }

    services
        .iter()
        .flat_map(|s| s.characteristics.iter())
        .find(|c| c.properties.is_writable())
        .cloned()
}

struct WirelessLink<P> {
    device: P,
    channel: GattCharacteristic,
    name: String,
}

/// Wireless printer transport over any [`GattCentral`]
pub struct WirelessTransport<C: GattCentral> {
    central: C,
    link: Option<WirelessLink<C::Peripheral>>,
    notifier: Option<DisconnectNotifier>,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl<C: GattCentral> WirelessTransport<C> {
    pub fn new(central: C) -> Self {
        Self {
            central,
            link: None,
            notifier: None,
            chunk_size: WIRELESS_CHUNK_SIZE,
            chunk_delay: WIRELESS_CHUNK_DELAY,
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// The characteristic currently written to
    pub fn channel(&self) -> Option<&GattCharacteristic> {
        self.link.as_ref().map(|l| &l.channel)
    }

    async fn choose_device(&self) -> PrintResult<ChooserResult<C::Peripheral>> {
        match self
            .central
            .request_device(&GattDeviceRequest::known_printers())
            .await?
        {
            ChooserResult::NoDevices => {
                tracing::debug!("No known printer services nearby, listing all devices");
                self.central
                    .request_device(&GattDeviceRequest::any_device())
                    .await
            }
            other => Ok(other),
        }
    }
}

async fn negotiate<P: GattPeripheral>(device: &mut P, name: &str) -> PrintResult<GattCharacteristic> {
    device.open().await?;
    let services = device.services().await?;
    tracing::debug!(device = %name, services = services.len(), "GATT services discovered");
    select_write_channel(&services).ok_or_else(|| PrintError::NoWritableChannel(name.to_string()))
}

#[async_trait]
impl<C: GattCentral> PrinterTransport for WirelessTransport<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::Wireless
    }

    fn is_supported(&self) -> bool {
        self.central.is_available()
    }

    async fn connect(&mut self) -> PrintResult<ConnectOutcome> {
        if !self.is_supported() {
            return Err(PrintError::Unsupported(TransportKind::Wireless.to_string()));
        }
        self.disconnect().await?;

        let mut device = match self.choose_device().await? {
            ChooserResult::Selected(device) => device,
            ChooserResult::Cancelled => return Ok(ConnectOutcome::Cancelled),
            ChooserResult::NoDevices => {
                return Err(PrintError::Connection(
                    "no wireless devices in range".to_string(),
                ));
            }
        };
        let name = device.name().unwrap_or_else(|| "Unknown printer".to_string());

        let channel = match negotiate(&mut device, &name).await {
            Ok(channel) => channel,
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
            service = %channel.service,
            characteristic = %channel.uuid,
            "Wireless printer connected"
        );
        self.link = Some(WirelessLink {
            device,
            channel,
            name: name.clone(),
        });
        Ok(ConnectOutcome::Connected { device_name: name })
    }

    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let link = self.link.as_mut().ok_or(PrintError::NotConnected)?;
        let mode = link.channel.write_mode();
        let total = data.len().div_ceil(self.chunk_size);

        for (i, chunk) in data.chunks(self.chunk_size).enumerate() {
            if i > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            link.device
                .write(&link.channel, chunk, mode)
                .await
                .map_err(|e| PrintError::Write(format!("chunk {}/{}: {}", i + 1, total, e)))?;
        }

        tracing::debug!(bytes = data.len(), chunks = total, "Wireless write complete");
        Ok(())
    }

    async fn disconnect(&mut self) -> PrintResult<()> {
        if let Some(mut link) = self.link.take() {
            tracing::info!(device = %link.name, "Disconnecting wireless printer");
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
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(Vec<u8>, WriteMode)>,
        closed: usize,
        requests: Vec<GattDeviceRequest>,
    }

    struct MockPeripheral {
        name: Option<String>,
        services: Vec<GattService>,
        fail_on_write: Option<usize>,
        recorder: Arc<Mutex<Recorder>>,
        notifier: Option<DisconnectNotifier>,
    }

    #[async_trait]
    impl GattPeripheral for MockPeripheral {
        fn name(&self) -> Option<String> {
            self.name.clone()
        }

        async fn open(&mut self) -> PrintResult<()> {
            Ok(())
        }

        async fn services(&mut self) -> PrintResult<Vec<GattService>> {
            Ok(self.services.clone())
        }

        async fn write(
            &mut self,
            _characteristic: &GattCharacteristic,
            data: &[u8],
            mode: WriteMode,
        ) -> PrintResult<()> {
            let mut rec = self.recorder.lock().unwrap();
            if self.fail_on_write == Some(rec.writes.len()) {
                return Err(PrintError::Backend("GATT operation failed".to_string()));
            }
            rec.writes.push((data.to_vec(), mode));
            Ok(())
        }

        async fn close(&mut self) -> PrintResult<()> {
            self.recorder.lock().unwrap().closed += 1;
            Ok(())
        }

        fn watch_disconnect(&mut self, notifier: DisconnectNotifier) {
            self.notifier = Some(notifier);
        }
    }

    struct MockCentral {
        available: bool,
        responses: Mutex<VecDeque<ChooserResult<MockPeripheral>>>,
        recorder: Arc<Mutex<Recorder>>,
    }

    #[async_trait]
    impl GattCentral for MockCentral {
        type Peripheral = MockPeripheral;

        fn is_available(&self) -> bool {
            self.available
        }

        async fn request_device(
            &self,
            request: &GattDeviceRequest,
        ) -> PrintResult<ChooserResult<MockPeripheral>> {
            self.recorder.lock().unwrap().requests.push(request.clone());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ChooserResult::Cancelled))
        }
    }

    fn characteristic(service: Uuid, uuid: Uuid, write: bool, wwr: bool) -> GattCharacteristic {
        GattCharacteristic {
            service,
            uuid,
            properties: CharacteristicProperties {
                write,
                write_without_response: wwr,
            },
        }
    }

    fn printer_services() -> Vec<GattService> {
        let svc = KNOWN_PRINTER_SERVICES[0];
        vec![GattService {
            uuid: svc,
            characteristics: vec![characteristic(svc, KNOWN_WRITE_CHARACTERISTICS[0], true, true)],
        }]
    }

    fn setup(
        responses: Vec<ChooserResult<MockPeripheral>>,
    ) -> (WirelessTransport<MockCentral>, Arc<Mutex<Recorder>>) {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let central = MockCentral {
            available: true,
            responses: Mutex::new(responses.into()),
            recorder: recorder.clone(),
        };
        (WirelessTransport::new(central), recorder)
    }

    fn peripheral(recorder: &Arc<Mutex<Recorder>>, services: Vec<GattService>) -> MockPeripheral {
        MockPeripheral {
            name: Some("MPT-II".to_string()),
            services,
            fail_on_write: None,
            recorder: recorder.clone(),
            notifier: None,
        }
    }

    #[test]
    fn test_select_prefers_known_characteristic() {
        let svc = KNOWN_PRINTER_SERVICES[2];
        let other = Uuid::from_u128(0x1234);
        let services = vec![GattService {
            uuid: svc,
            characteristics: vec![
                characteristic(svc, other, true, false),
                characteristic(svc, KNOWN_WRITE_CHARACTERISTICS[2], false, true),
            ],
        }];

        let c = select_write_channel(&services).unwrap();
        assert_eq!(c.uuid, KNOWN_WRITE_CHARACTERISTICS[2]);
        assert_eq!(c.write_mode(), WriteMode::WithoutResponse);
    }

    #[test]
    fn test_select_any_writable_in_known_service() {
        let svc = KNOWN_PRINTER_SERVICES[3];
        let read_only = Uuid::from_u128(0xaaaa);
        let writable = Uuid::from_u128(0xbbbb);
        let services = vec![GattService {
            uuid: svc,
            characteristics: vec![
                characteristic(svc, read_only, false, false),
                characteristic(svc, writable, true, false),
            ],
        }];

        assert_eq!(select_write_channel(&services).unwrap().uuid, writable);
    }

    #[test]
    fn test_select_falls_back_to_unknown_services() {
        let svc = Uuid::from_u128(0xfeed);
        let writable = Uuid::from_u128(0xbeef);
        let services = vec![
            GattService {
                uuid: Uuid::from_u128(0x180a),
                characteristics: vec![characteristic(
                    Uuid::from_u128(0x180a),
                    Uuid::from_u128(0x2a29),
                    false,
                    false,
                )],
            },
            GattService {
                uuid: svc,
                characteristics: vec![characteristic(svc, writable, false, true)],
            },
        ];

        assert_eq!(select_write_channel(&services).unwrap().uuid, writable);
        assert!(select_write_channel(&services[..1]).is_none());
    }

    #[tokio::test]
    async fn test_connect_retries_with_accept_all() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let device = peripheral(&recorder, printer_services());
        let central = MockCentral {
            available: true,
            responses: Mutex::new(
                vec![ChooserResult::NoDevices, ChooserResult::Selected(device)].into(),
            ),
            recorder: recorder.clone(),
        };
        let mut transport = WirelessTransport::new(central);

        let outcome = transport.connect().await.unwrap();
        assert_eq!(
            outcome,
            ConnectOutcome::Connected {
                device_name: "MPT-II".to_string()
            }
        );

        let rec = recorder.lock().unwrap();
        assert_eq!(rec.requests.len(), 2);
        assert!(!rec.requests[0].accept_all_devices);
        assert!(rec.requests[1].accept_all_devices);
    }

    #[tokio::test]
    async fn test_cancelled_chooser_is_not_an_error() {
        let (mut transport, _) = setup(vec![ChooserResult::Cancelled]);
        assert_eq!(transport.connect().await.unwrap(), ConnectOutcome::Cancelled);
        assert!(transport.device_name().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_host() {
        let (mut transport, rec) = setup(vec![]);
        transport.central.available = false;

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, PrintError::Unsupported(_)));
        assert!(rec.lock().unwrap().requests.is_empty());
    }

    #[tokio::test]
    async fn test_no_writable_channel_closes_device() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let svc = Uuid::from_u128(0x180a);
        let device = peripheral(
            &recorder,
            vec![GattService {
                uuid: svc,
                characteristics: vec![characteristic(svc, Uuid::from_u128(0x2a29), false, false)],
            }],
        );
        let central = MockCentral {
            available: true,
            responses: Mutex::new(vec![ChooserResult::Selected(device)].into()),
            recorder: recorder.clone(),
        };
        let mut transport = WirelessTransport::new(central);

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, PrintError::NoWritableChannel(_)));
        assert_eq!(recorder.lock().unwrap().closed, 1);
        assert!(transport.device_name().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_chunks_reconstruct_stream() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let device = peripheral(&recorder, printer_services());
        let central = MockCentral {
            available: true,
            responses: Mutex::new(vec![ChooserResult::Selected(device)].into()),
            recorder: recorder.clone(),
        };
        let mut transport = WirelessTransport::new(central);
        transport.connect().await.unwrap();

        let data: Vec<u8> = (0..1300u32).map(|i| (i % 251) as u8).collect();
        transport.write(&data).await.unwrap();

        let rec = recorder.lock().unwrap();
        let sizes: Vec<usize> = rec.writes.iter().map(|(c, _)| c.len()).collect();
        assert_eq!(sizes, vec![512, 512, 276]);
        assert!(rec.writes.iter().all(|(_, m)| *m == WriteMode::WithResponse));
        let joined: Vec<u8> = rec.writes.iter().flat_map(|(c, _)| c.clone()).collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_failed_chunk_aborts_stream() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let mut device = peripheral(&recorder, printer_services());
        device.fail_on_write = Some(1);
        let central = MockCentral {
            available: true,
            responses: Mutex::new(vec![ChooserResult::Selected(device)].into()),
            recorder: recorder.clone(),
        };
        let mut transport = WirelessTransport::new(central).with_chunk_delay(Duration::ZERO);
        transport.connect().await.unwrap();

        let err = transport.write(&[0u8; 2000]).await.unwrap_err();
        assert!(matches!(err, PrintError::Write(ref m) if m.starts_with("chunk 2/4")));
        assert_eq!(recorder.lock().unwrap().writes.len(), 1);
        // still linked; only an out-of-band event drops the connection
        assert_eq!(transport.device_name().as_deref(), Some("MPT-II"));
    }

    #[tokio::test]
    async fn test_write_without_connection() {
        let (mut transport, _) = setup(vec![]);
        let err = transport.write(b"hello").await.unwrap_err();
        assert!(matches!(err, PrintError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let device = peripheral(&recorder, printer_services());
        let central = MockCentral {
            available: true,
            responses: Mutex::new(vec![ChooserResult::Selected(device)].into()),
            recorder: recorder.clone(),
        };
        let mut transport = WirelessTransport::new(central);
        transport.connect().await.unwrap();

        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert_eq!(recorder.lock().unwrap().closed, 1);
        assert!(transport.device_name().is_none());
    }
}
