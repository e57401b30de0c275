//! Caller-facing error system
//!
//! - [`ErrorCode`]: numeric codes shared with the UI layer
//! - [`AppError`]: code + message + optional details
//!
//! All codes live in the 92xx printer range.
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::with_message(ErrorCode::PrinterConnectionFailed, "no writable channel");
//! assert_eq!(err.code, ErrorCode::PrinterConnectionFailed);
//! ```

mod codes;
mod types;

pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::AppError;
