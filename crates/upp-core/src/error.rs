//! Error types for upp-core
//!
//! Every failure names the step that failed and, where it applies, the page
//! address or signal involved. None of these are fatal: callers may re-run the
//! failing step.

use thiserror::Error;

use crate::flash::ImageError;
use crate::protocol::Operation;

/// Why a device refused an operation it did acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Programming-mode init answered with something other than the success code
    InitRefused {
        /// Code returned by the device
        code: u8,
    },
    /// The doppel bus has not been configured
    NotConfigured,
}

impl core::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InitRefused { code } => write!(f, "device answered with code {}", code),
            Self::NotConfigured => write!(f, "doppel network port not configured"),
        }
    }
}

/// Malformed local inputs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A custom pin mapping does not cover every socket pin
    #[error("custom mapping for '{interface}' is incomplete: {mapped}/{pin_count} pins defined")]
    MappingLength {
        /// Interface name
        interface: String,
        /// Entries in the mapping
        mapped: usize,
        /// Pins on the socket
        pin_count: u8,
    },

    /// A socket pin outside the socket
    #[error("socket pin {pin} is out of range for '{interface}'")]
    SocketPinOutOfRange {
        /// Interface name
        interface: String,
        /// Requested socket pin
        pin: u8,
    },

    /// A signal that is not hardwired was requested without a device
    #[error("signal '{signal}' is not mapped on '{interface}'; a device is needed to resolve it")]
    SignalNeedsDevice {
        /// Interface name
        interface: String,
        /// Requested signal
        signal: String,
    },

    /// The device does not expose the signal
    #[error("unknown signal '{signal}' on device {device}")]
    UnknownSignal {
        /// Device name
        device: String,
        /// Requested signal
        signal: String,
    },

    /// A signal map handed to configure-chip lacks a programming signal
    #[error("signal map is missing '{signal}'")]
    MissingSignal {
        /// Missing signal
        signal: String,
    },

    /// The interface has no socket geometry to transpose package pins onto
    #[error("interface '{interface}' does not support device pin mapping")]
    NoPinMapping {
        /// Interface name
        interface: String,
    },

    /// The device has no package pin count
    #[error("device {device} has no package pin layout")]
    NoPackageLayout {
        /// Device name
        device: String,
    },

    /// The package pin does not fit on the socket
    #[error("package pin {pin} of {device} does not fit on '{interface}'")]
    PinDoesNotFit {
        /// Device name
        device: String,
        /// Interface name
        interface: String,
        /// Package pin
        pin: u8,
    },

    /// Only descriptors with a signature can be registered
    #[error("device {device} has no signature and cannot be registered")]
    MissingSignature {
        /// Device name
        device: String,
    },

    /// No socket interface has this name
    #[error("unknown socket interface '{name}'")]
    UnknownInterface {
        /// Requested name
        name: String,
    },

    /// A session needs at least one socket interface
    #[error("no socket interfaces configured")]
    NoInterfaces,

    /// A payload exceeds its 1-byte length field
    #[error("{what} of {len} bytes exceeds the 255-byte limit")]
    TooLong {
        /// What was too long
        what: &'static str,
        /// Actual length
        len: usize,
    },

    /// An image address does not fit the 2-byte address field
    #[error("address 0x{address:X} exceeds the 16-bit address space")]
    AddressOutOfRange {
        /// Offending address
        address: u32,
    },

    /// The device has no flash page size
    #[error("device {device} has no flash page size")]
    NoPageSize {
        /// Device name
        device: String,
    },

    /// Page size is not usable for paging an image
    #[error("invalid page size {0}")]
    InvalidPageSize(u16),
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The transport gave up without an acknowledged response
    #[error("{operation}: no response from programmer")]
    NoResponse {
        /// Operation that got no response
        operation: Operation,
    },

    /// The device responded but refused the operation
    #[error("{operation}: rejected ({reason})")]
    Rejected {
        /// Refused operation
        operation: Operation,
        /// Why it was refused
        reason: RejectReason,
    },

    /// A response lacked a field from the wire catalog
    #[error("{operation}: response is missing field '{field}'")]
    MissingField {
        /// Operation whose response was incomplete
        operation: Operation,
        /// Missing field
        field: &'static str,
    },

    /// No interface/prototype combination established communication
    #[error("could not communicate with a chip in any socket interface")]
    NoDeviceResponded,

    /// A chip responded but its signature is not in the registry
    #[error("unable to identify chip in {interface} with signature 0x{signature:06X}")]
    UnknownDevice {
        /// Interface the chip was found in
        interface: String,
        /// Masked 24-bit signature
        signature: u32,
    },

    /// A device-dependent step ran before discovery
    #[error("no device identified; run discovery first")]
    NotIdentified,

    /// Read-back of a programmed page differs from the image
    #[error("verify error in page 0x{address:04X}: byte {offset} expected 0x{expected:02X}, read 0x{actual:02X}")]
    PageVerify {
        /// Page address
        address: u16,
        /// Offset of the first differing byte within the page
        offset: usize,
        /// Byte from the image
        expected: u8,
        /// Byte read back
        actual: u8,
    },

    /// Read-back of a page returned fewer bytes than the page holds
    #[error("verify error in page 0x{address:04X}: read back {actual} bytes, expected at least {expected}")]
    ShortRead {
        /// Page address
        address: u16,
        /// Bytes in the page
        expected: usize,
        /// Bytes returned
        actual: usize,
    },

    /// Read-back of an EEPROM byte differs from what was written
    #[error("EEPROM verify error at address {address}: wrote {expected}, read back {actual}")]
    EepromVerify {
        /// EEPROM address
        address: u8,
        /// Value written
        expected: u8,
        /// Value read back
        actual: u8,
    },

    /// A page-level step failed
    #[error("page 0x{address:04X}: {source}")]
    Page {
        /// Page address
        address: u16,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Malformed local input
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Program image could not be read
    #[error("image error: {0}")]
    Image(#[from] ImageError),
}

impl Error {
    /// Whether this is a verify mismatch (page or EEPROM)
    pub fn is_verify_mismatch(&self) -> bool {
        match self {
            Error::PageVerify { .. } | Error::ShortRead { .. } | Error::EepromVerify { .. } => true,
            Error::Page { source, .. } => source.is_verify_mismatch(),
            _ => false,
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
