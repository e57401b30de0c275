//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Transport not available in this runtime (no adapter, no USB access)
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Opening the device session failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Device opened but exposes nothing we can stream bytes to
    #[error("No writable channel: {0}")]
    NoWritableChannel(String),

    /// Write attempted without an active connection
    #[error("Printer not connected")]
    NotConnected,

    /// A chunk write failed mid-stream
    #[error("Write failed: {0}")]
    Write(String),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Error reported by the hardware backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
