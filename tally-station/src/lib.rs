//! # tally-station
//!
//! Offline-resilient receipt printing for the restaurant station:
//! rendering, the printer session, the durable print queue and its
//! replay. Byte-level printing lives in `tally-printer`.

pub mod core;
pub mod printing;
pub mod utils;

pub use crate::core::Config;
pub use crate::printing::{
    ConnectionState, DeliveryFailure, KitchenTicketRenderer, LinkStatus, PrintOutcome,
    PrintQueue, PrinterSession, QueueError, QueuePolicy, QueueReplayer, ReceiptRenderer,
    RedbPrintQueue, ReplaySummary, SessionError,
};
pub use crate::utils::{init_logger_with_file, setup_environment};
