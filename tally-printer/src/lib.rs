//! # tally-printer
//!
//! Thermal receipt printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building and fixed-width row layout
//! - UTF-8 or GBK text output
//! - Wireless (GATT) and wired (USB bulk) transports behind [`PrinterTransport`]
//! - Hardware backends: `nusb` (feature `usb`, default) and `btleplug` (feature `ble`)
//!
//! Business logic (WHAT to print) stays in application code:
//! - Receipt and kitchen ticket rendering, print session, queue → tally-station
//!
//! ## Example
//!
//! ```ignore
//! use tally_printer::{EscPosBuilder, FirstDevice, NusbHost, PrinterTransport, WiredTransport};
//!
//! let mut builder = EscPosBuilder::new(48);
//! builder.center().double_size().line("KITCHEN ORDER").reset_size();
//! builder.sep_double().left().row("Order #105", "Table T12");
//! builder.cut();
//!
//! let mut printer = WiredTransport::new(NusbHost::new(FirstDevice));
//! printer.connect().await?;
//! printer.write(&builder.build()).await?;
//! ```

mod encoding;
mod error;
mod escpos;
pub mod transport;

// Re-exports
pub use encoding::{ELLIPSIS, TextEncoding, convert_to_gbk, gbk_width};
pub use error::{PrintError, PrintResult};
pub use escpos::{DEFAULT_WIDTH, EscPosBuilder, ITEM_TOTAL_COLUMN, cmd, layout_item_row, layout_row};
pub use transport::wired::{WIRED_CHUNK_SIZE, WiredTransport};
pub use transport::wireless::{WIRELESS_CHUNK_DELAY, WIRELESS_CHUNK_SIZE, WirelessTransport};
pub use transport::{
    ConnectOutcome, DeviceChooser, DisconnectEvent, DisconnectNotifier, FirstDevice, NamedDevice,
    PrinterTransport, TransportKind,
};

#[cfg(feature = "ble")]
pub use transport::ble::{BleCentral, BlePeripheral};
#[cfg(feature = "usb")]
pub use transport::usb::{NusbDevice, NusbHost};
