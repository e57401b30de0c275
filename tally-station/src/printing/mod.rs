//! Receipt and Kitchen Printing Module
//!
//! This module turns documents into printed paper, or into queued jobs:
//! - Rendering: receipts and kitchen tickets as ESC/POS bytes
//! - Session: the single printer connection and print dispatch
//! - Queue: durable record of prints that did not reach the printer
//! - Replay: pull-based redelivery of pending jobs

pub mod queue;
pub mod renderer;
pub mod replay;
pub mod session;
pub mod state;
pub mod storage;

pub use queue::{EVICTED_MESSAGE, PrintQueue, QueuePolicy};
pub use renderer::{KitchenTicketRenderer, ReceiptRenderer, format_money};
pub use replay::{QueueReplayer, ReplaySummary};
pub use session::{
    DISCONNECTED_MID_WRITE, DeliveryFailure, PrintOutcome, PrinterSession, SessionError,
    SessionResult,
};
pub use state::{ConnectionState, LinkStatus};
pub use storage::{QueueError, QueueResult, QueueStats, RedbPrintQueue};
