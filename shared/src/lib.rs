//! Shared types for the Tally printing stack
//!
//! Document models handed to the encoder, queue records, and the
//! caller-facing error type used by every crate in the workspace.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, ErrorCode};
pub use models::*;
