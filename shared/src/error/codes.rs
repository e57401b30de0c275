//! Unified error codes
//!
//! Codes are plain `u16` values so they serialize identically for the
//! Rust side and the UI layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 92xx: Printer ====================
    /// Transport is not supported by this runtime
    PrinterNotSupported = 9200,
    /// No printer connected
    PrinterNotAvailable = 9201,
    /// Print operation failed
    PrintFailed = 9202,
    /// Connecting to the printer failed
    PrinterConnectionFailed = 9203,
    /// Print job stored for later delivery
    PrintQueued = 9204,
    /// Print queue could not record the job
    PrintQueueUnavailable = 9205,
}

impl ErrorCode {
    /// Numeric value of the code
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Default user-visible message
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::PrinterNotSupported => "Printer connection is not supported on this device",
            ErrorCode::PrinterNotAvailable => "Printer is not connected",
            ErrorCode::PrintFailed => "Print operation failed",
            ErrorCode::PrinterConnectionFailed => "Connection failed",
            ErrorCode::PrintQueued => "Queued for later",
            ErrorCode::PrintQueueUnavailable => "Print queue is unavailable",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Raised when a `u16` does not name a known [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            9200 => Ok(ErrorCode::PrinterNotSupported),
            9201 => Ok(ErrorCode::PrinterNotAvailable),
            9202 => Ok(ErrorCode::PrintFailed),
            9203 => Ok(ErrorCode::PrinterConnectionFailed),
            9204 => Ok(ErrorCode::PrintQueued),
            9205 => Ok(ErrorCode::PrintQueueUnavailable),
            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printer_codes() {
        assert_eq!(ErrorCode::PrinterNotAvailable.code(), 9201);
        assert_eq!(ErrorCode::PrintQueued.code(), 9204);
    }

    #[test]
    fn test_try_from_roundtrip() {
        for code in [
            ErrorCode::PrinterNotSupported,
            ErrorCode::PrintQueued,
            ErrorCode::PrintQueueUnavailable,
        ] {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
        assert_eq!(ErrorCode::try_from(0), Err(InvalidErrorCode(0)));
        assert_eq!(ErrorCode::try_from(9206), Err(InvalidErrorCode(9206)));
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::PrintFailed).unwrap();
        assert_eq!(json, "9202");
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorCode::PrintFailed);
    }
}
