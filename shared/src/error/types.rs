//! Application error type

use super::codes::ErrorCode;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
///
/// This is what the UI layer sees. Transport internals are folded into
/// the message; the code says which of the user-visible outcomes applies.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    // ==================== Convenience constructors ====================

    /// Printer transport not supported by the runtime
    pub fn printer_not_supported(transport: impl Into<String>) -> Self {
        let t = transport.into();
        Self::new(ErrorCode::PrinterNotSupported).with_detail("transport", t)
    }

    /// No printer connected
    pub fn not_connected() -> Self {
        Self::new(ErrorCode::PrinterNotAvailable)
    }

    /// Connecting to a printer failed
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::with_message(
            ErrorCode::PrinterConnectionFailed,
            format!("Connection failed: {}", reason.into()),
        )
    }
}
