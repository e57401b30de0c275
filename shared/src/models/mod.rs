//! Data models
//!
//! Documents are fully computed by the caller; nothing here derives
//! totals or taxes.

pub mod kitchen;
pub mod print_job;
pub mod receipt;

// Re-exports
pub use kitchen::*;
pub use print_job::*;
pub use receipt::*;
