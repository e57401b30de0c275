//! Printer transports
//!
//! One capability set over two incompatible device models:
//!
//! ```text
//! PrinterTransport
//!   ├── WirelessTransport<C: GattCentral>   (GATT service/characteristic, 512 B chunks)
//!   └── WiredTransport<H: UsbHost>          (configuration/interface/bulk OUT, 64 KiB chunks)
//! ```
//!
//! Hardware access sits behind the `GattCentral` and `UsbHost` backend
//! traits; real backends live in the `ble` and `usb` feature modules.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{PrintError, PrintResult};

pub mod chooser;
pub mod wired;
pub mod wireless;

#[cfg(feature = "ble")]
pub mod ble;
#[cfg(feature = "usb")]
pub mod usb;

pub use chooser::{ChooserResult, DeviceCandidate, DeviceChooser, FirstDevice, NamedDevice};
pub use wired::{
    BulkOutTarget, EndpointDirection, EndpointTransfer, UsbAlternate, UsbConfiguration,
    UsbDevice, UsbDeviceFilter, UsbDeviceRequest, UsbEndpoint, UsbHost, WiredTransport,
    find_bulk_out,
};
pub use wireless::{
    CharacteristicProperties, GattCentral, GattCharacteristic, GattDeviceRequest,
    GattPeripheral, GattService, WirelessTransport, WriteMode, select_write_channel,
};

/// Physical transport family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Wireless,
    Wired,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Wireless => f.write_str("wireless"),
            TransportKind::Wired => f.write_str("wired"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wireless" | "bluetooth" | "ble" => Ok(TransportKind::Wireless),
            "wired" | "usb" => Ok(TransportKind::Wired),
            other => Err(PrintError::InvalidConfig(format!(
                "unknown printer transport: {}",
                other
            ))),
        }
    }
}

/// Result of a connect attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { device_name: String },
    /// The user closed the device chooser without picking a device
    Cancelled,
}

/// Out-of-band loss of the device (unplugged, powered off, out of range)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectEvent {
    pub kind: TransportKind,
    pub device_name: Option<String>,
    pub reason: String,
}

/// Sending half of a disconnect subscription
///
/// The session creates one channel per connection and hands this half
/// to the transport; dropping the receiver unsubscribes.
#[derive(Debug, Clone)]
pub struct DisconnectNotifier {
    kind: TransportKind,
    tx: mpsc::UnboundedSender<DisconnectEvent>,
}

impl DisconnectNotifier {
    pub fn channel(kind: TransportKind) -> (Self, mpsc::UnboundedReceiver<DisconnectEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { kind, tx }, rx)
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Report the disconnect; returns false once nobody is listening
    pub fn notify(&self, device_name: Option<String>, reason: impl Into<String>) -> bool {
        self.tx
            .send(DisconnectEvent {
                kind: self.kind,
                device_name,
                reason: reason.into(),
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Capability contract shared by both transports
///
/// `write` sends the whole stream in order; chunk k+1 is only issued
/// after chunk k resolved. A failed chunk aborts the stream with no
/// compensation for what was already sent.
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether this runtime can use the transport at all
    fn is_supported(&self) -> bool;

    /// Present the device chooser and open a writable channel
    async fn connect(&mut self) -> PrintResult<ConnectOutcome>;

    async fn write(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Close the device; a no-op when nothing is connected
    async fn disconnect(&mut self) -> PrintResult<()>;

    fn device_name(&self) -> Option<String>;

    /// Register where out-of-band disconnects are reported
    fn on_disconnect(&mut self, notifier: DisconnectNotifier);
}

#[async_trait]
impl<T: PrinterTransport + ?Sized> PrinterTransport for Box<T> {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn is_supported(&self) -> bool {
        (**self).is_supported()
    }

    async fn connect(&mut self) -> PrintResult<ConnectOutcome> {
        (**self).connect().await
    }

    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        (**self).write(data).await
    }

    async fn disconnect(&mut self) -> PrintResult<()> {
        (**self).disconnect().await
    }

    fn device_name(&self) -> Option<String> {
        (**self).device_name()
    }

    fn on_disconnect(&mut self, notifier: DisconnectNotifier) {
        (**self).on_disconnect(notifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("USB".parse::<TransportKind>().unwrap(), TransportKind::Wired);
        assert_eq!(
            "bluetooth".parse::<TransportKind>().unwrap(),
            TransportKind::Wireless
        );
        assert!("serial".parse::<TransportKind>().is_err());
    }

    #[tokio::test]
    async fn test_notifier_closed_after_receiver_drop() {
        let (notifier, mut rx) = DisconnectNotifier::channel(TransportKind::Wired);
        assert!(notifier.notify(Some("POS-80".to_string()), "unplugged"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, TransportKind::Wired);
        assert_eq!(event.reason, "unplugged");

        drop(rx);
        assert!(notifier.is_closed());
        assert!(!notifier.notify(None, "gone"));
    }
}
