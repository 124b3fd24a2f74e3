//! Error types for Gestalt node communication

use thiserror::Error;

/// Gestalt-specific errors
#[derive(Debug, Error)]
pub enum GestaltError {
    /// Failed to connect to the node
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    /// Timeout during communication
    #[error("Communication timeout")]
    Timeout,

    /// Frame did not start with the start byte
    #[error("Bad start byte 0x{0:02X}")]
    BadStart(u8),

    /// Frame checksum mismatch
    #[error("CRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    CrcMismatch {
        /// Checksum computed over the frame
        expected: u8,
        /// Checksum carried by the frame
        actual: u8,
    },

    /// Frame or payload shorter than its declared layout
    #[error("Truncated {0}")]
    Truncated(&'static str),

    /// Reply came from a different port than the request went to
    #[error("Reply on port {actual}, expected {expected}")]
    PortMismatch {
        /// Port the request was sent to
        expected: u8,
        /// Port the reply carried
        actual: u8,
    },

    /// Reply came from a different node
    #[error("Reply from node {actual}, expected {expected}")]
    AddressMismatch {
        /// Node the request was sent to
        expected: u16,
        /// Address the reply carried
        actual: u16,
    },

    /// A request lacks a field from its template
    #[error("Request is missing field '{0}'")]
    MissingField(&'static str),

    /// A field value does not fit its width
    #[error("Value {value} does not fit field '{field}'")]
    FieldOverflow {
        /// Field name
        field: &'static str,
        /// Offending value
        value: u32,
    },

    /// Payload exceeds the 1-byte length field
    #[error("Payload of {0} bytes is too long")]
    PayloadTooLong(usize),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for Gestalt operations
pub type Result<T> = core::result::Result<T, GestaltError>;

impl From<std::io::Error> for GestaltError {
    fn from(e: std::io::Error) -> Self {
        GestaltError::IoError(e.to_string())
    }
}
