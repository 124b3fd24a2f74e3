//! Wire catalog for the programmer node
//!
//! Every request the host can issue is an [`Operation`] bound to a port on the
//! node. Each operation carries an ordered request template and an ordered
//! response template. The byte-level encoding of those templates belongs to
//! the transport; this module only fixes names, widths and order.

use core::fmt;

use crate::error::{Error, Result};

/// Response code returned by a successful programming-mode init
pub const PROG_INIT_OK: u8 = 83;

/// Signatures travel in a 4-byte field; only the low 24 bits identify the chip
pub const SIGNATURE_MASK: u32 = 0x00FF_FFFF;

/// Field names used by the wire catalog
pub mod field {
    /// Ground pin (configure-chip)
    pub const GND: &str = "gnd";
    /// Supply pin (configure-chip)
    pub const VCC: &str = "vcc";
    /// SPI clock pin (configure-chip)
    pub const SCK: &str = "sck";
    /// SPI MISO pin (configure-chip)
    pub const MISO: &str = "miso";
    /// SPI MOSI pin (configure-chip)
    pub const MOSI: &str = "mosi";
    /// Reset pin (configure-chip)
    pub const RESET: &str = "reset";
    /// Programming-mode init status
    pub const RESPONSE_CODE: &str = "responseCode";
    /// Device signature, 4 bytes with an ignored top byte
    pub const SIGNATURE_BYTES: &str = "signatureBytes";
    /// Low fuse byte
    pub const LFUSE: &str = "lfuse";
    /// High fuse byte
    pub const HFUSE: &str = "hfuse";
    /// Extended fuse byte
    pub const EFUSE: &str = "efuse";
    /// Byte count of a page load or read
    pub const DATA_SIZE: &str = "dataSize";
    /// First byte address of a page load or read
    pub const BYTE_BASE_ADDRESS: &str = "byteBaseAddress";
    /// Page bytes, or a single EEPROM byte
    pub const DATA: &str = "data";
    /// Address of the page to commit
    pub const BYTE_PAGE_ADDRESS: &str = "bytePageAddress";
    /// EEPROM address, or doppel destination address
    pub const ADDRESS: &str = "address";
    /// Internal pin number to sample
    pub const PIN: &str = "pin";
    /// Sampled pin level
    pub const VALUE: &str = "value";
    /// Doppel clock pin
    pub const SCL_PIN: &str = "sclPin";
    /// Doppel data pin
    pub const SDA_PIN: &str = "sdaPin";
    /// Doppel frame length (address byte included)
    pub const PACKET_LENGTH: &str = "packetLength";
    /// Doppel message bytes
    pub const MESSAGE: &str = "message";
    /// Whether the doppel bus has been configured
    pub const IS_CONFIGURED: &str = "isConfigured";
}

/// Shape of a single field in a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned little-endian integer of the given width in bytes (1..=4)
    Uint(u8),
    /// Variable-length byte list, always the last field of a template
    List,
}

/// A named field in a request or response template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name
    pub name: &'static str,
    /// Field shape
    pub kind: FieldKind,
}

impl Field {
    /// An unsigned integer field
    pub const fn uint(name: &'static str, width: u8) -> Self {
        Self {
            name,
            kind: FieldKind::Uint(width),
        }
    }

    /// A variable-length byte list field
    pub const fn list(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::List,
        }
    }
}

const CONFIGURE_CHIP_REQUEST: &[Field] = &[
    Field::uint(field::GND, 1),
    Field::uint(field::VCC, 1),
    Field::uint(field::SCK, 1),
    Field::uint(field::MISO, 1),
    Field::uint(field::MOSI, 1),
    Field::uint(field::RESET, 1),
];
const PROG_INIT_RESPONSE: &[Field] = &[Field::uint(field::RESPONSE_CODE, 1)];
const SIGNATURE_RESPONSE: &[Field] = &[Field::uint(field::SIGNATURE_BYTES, 4)];
const FUSES: &[Field] = &[
    Field::uint(field::LFUSE, 1),
    Field::uint(field::HFUSE, 1),
    Field::uint(field::EFUSE, 1),
];
const LOAD_DATA_REQUEST: &[Field] = &[
    Field::uint(field::DATA_SIZE, 1),
    Field::uint(field::BYTE_BASE_ADDRESS, 2),
    Field::list(field::DATA),
];
const WRITE_PAGE_REQUEST: &[Field] = &[Field::uint(field::BYTE_PAGE_ADDRESS, 2)];
const READ_DATA_REQUEST: &[Field] = &[
    Field::uint(field::DATA_SIZE, 1),
    Field::uint(field::BYTE_BASE_ADDRESS, 2),
];
const READ_DATA_RESPONSE: &[Field] = &[Field::list(field::DATA)];
const WRITE_EEPROM_REQUEST: &[Field] = &[Field::uint(field::ADDRESS, 1), Field::uint(field::DATA, 1)];
const READ_EEPROM_REQUEST: &[Field] = &[Field::uint(field::ADDRESS, 1)];
const READ_EEPROM_RESPONSE: &[Field] = &[Field::uint(field::DATA, 1)];
const READ_PIN_REQUEST: &[Field] = &[Field::uint(field::PIN, 1)];
const READ_PIN_RESPONSE: &[Field] = &[Field::uint(field::VALUE, 1)];
const CONFIGURE_DOPPEL_REQUEST: &[Field] = &[
    Field::uint(field::SCL_PIN, 1),
    Field::uint(field::SDA_PIN, 1),
];
const SEND_DOPPEL_REQUEST: &[Field] = &[
    Field::uint(field::PACKET_LENGTH, 1),
    Field::uint(field::ADDRESS, 1),
    Field::list(field::MESSAGE),
];
const IS_CONFIGURED_RESPONSE: &[Field] = &[Field::uint(field::IS_CONFIGURED, 1)];
const READ_DOPPEL_RESPONSE: &[Field] = &[Field::list(field::MESSAGE)];

/// Operations understood by the programmer node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Route the programming signals to internal pins
    ConfigureChip,
    /// Enter serial programming mode
    ProgInit,
    /// Read the device signature
    ReadSignature,
    /// Read lfuse/hfuse/efuse
    ReadFuses,
    /// Write all three fuse bytes
    WriteFuses,
    /// Erase program memory
    EraseChip,
    /// Stage bytes into the on-device page buffer
    LoadData,
    /// Commit the page buffer to flash
    WritePage,
    /// Read back program memory
    ReadData,
    /// Write one EEPROM byte
    WriteEeprom,
    /// Read one EEPROM byte
    ReadEeprom,
    /// Release reset and float the socket pins
    RunChip,
    /// Signature read during the last programming session
    LastKnownSignature,
    /// Sample an internal programmer pin
    ReadInternalPin,
    /// Assign the doppel bus pins
    ConfigureDoppel,
    /// Start buffering incoming doppel messages
    EnableDoppelReceiver,
    /// Send one doppel message
    SendDoppelMessage,
    /// Fetch the doppel message buffer
    ReadDoppelMessages,
    /// Clear the doppel message buffer
    ResetDoppelBuffer,
    /// Return the node to free-running mode
    EnterFreeRunningMode,
}

impl Operation {
    /// All operations, in port order
    pub const ALL: [Operation; 20] = [
        Operation::ConfigureChip,
        Operation::ProgInit,
        Operation::ReadSignature,
        Operation::ReadFuses,
        Operation::WriteFuses,
        Operation::EraseChip,
        Operation::LoadData,
        Operation::WritePage,
        Operation::ReadData,
        Operation::WriteEeprom,
        Operation::ReadEeprom,
        Operation::RunChip,
        Operation::LastKnownSignature,
        Operation::ReadInternalPin,
        Operation::ConfigureDoppel,
        Operation::EnableDoppelReceiver,
        Operation::SendDoppelMessage,
        Operation::ReadDoppelMessages,
        Operation::ResetDoppelBuffer,
        Operation::EnterFreeRunningMode,
    ];

    /// Port the operation is bound to on the node
    pub const fn port(self) -> u8 {
        match self {
            Operation::ConfigureChip => 10,
            Operation::ProgInit => 11,
            Operation::ReadSignature => 12,
            Operation::ReadFuses => 13,
            Operation::WriteFuses => 14,
            Operation::EraseChip => 15,
            Operation::LoadData => 16,
            Operation::WritePage => 17,
            Operation::ReadData => 18,
            Operation::WriteEeprom => 19,
            Operation::ReadEeprom => 20,
            Operation::RunChip => 21,
            Operation::LastKnownSignature => 22,
            Operation::ReadInternalPin => 23,
            Operation::ConfigureDoppel => 30,
            Operation::EnableDoppelReceiver => 31,
            Operation::SendDoppelMessage => 32,
            Operation::ReadDoppelMessages => 33,
            Operation::ResetDoppelBuffer => 34,
            Operation::EnterFreeRunningMode => 35,
        }
    }

    /// Look up an operation by port
    pub fn from_port(port: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.port() == port)
    }

    /// Human-readable step name, used in error messages
    pub const fn name(self) -> &'static str {
        match self {
            Operation::ConfigureChip => "configure chip",
            Operation::ProgInit => "programming mode init",
            Operation::ReadSignature => "read signature",
            Operation::ReadFuses => "read fuses",
            Operation::WriteFuses => "write fuses",
            Operation::EraseChip => "erase chip",
            Operation::LoadData => "load page buffer",
            Operation::WritePage => "commit page",
            Operation::ReadData => "read back",
            Operation::WriteEeprom => "write EEPROM",
            Operation::ReadEeprom => "read EEPROM",
            Operation::RunChip => "run chip",
            Operation::LastKnownSignature => "last known signature",
            Operation::ReadInternalPin => "read internal pin",
            Operation::ConfigureDoppel => "configure doppel",
            Operation::EnableDoppelReceiver => "enable doppel receiver",
            Operation::SendDoppelMessage => "send doppel message",
            Operation::ReadDoppelMessages => "read doppel messages",
            Operation::ResetDoppelBuffer => "reset doppel buffer",
            Operation::EnterFreeRunningMode => "enter free-running mode",
        }
    }

    /// Ordered request template
    pub const fn request_fields(self) -> &'static [Field] {
        match self {
            Operation::ConfigureChip => CONFIGURE_CHIP_REQUEST,
            Operation::WriteFuses => FUSES,
            Operation::LoadData => LOAD_DATA_REQUEST,
            Operation::WritePage => WRITE_PAGE_REQUEST,
            Operation::ReadData => READ_DATA_REQUEST,
            Operation::WriteEeprom => WRITE_EEPROM_REQUEST,
            Operation::ReadEeprom => READ_EEPROM_REQUEST,
            Operation::ReadInternalPin => READ_PIN_REQUEST,
            Operation::ConfigureDoppel => CONFIGURE_DOPPEL_REQUEST,
            Operation::SendDoppelMessage => SEND_DOPPEL_REQUEST,
            _ => &[],
        }
    }

    /// Ordered response template (empty for bare acknowledgements)
    pub const fn response_fields(self) -> &'static [Field] {
        match self {
            Operation::ProgInit => PROG_INIT_RESPONSE,
            Operation::ReadSignature | Operation::LastKnownSignature => SIGNATURE_RESPONSE,
            Operation::ReadFuses => FUSES,
            Operation::ReadData => READ_DATA_RESPONSE,
            Operation::ReadEeprom => READ_EEPROM_RESPONSE,
            Operation::ReadInternalPin => READ_PIN_RESPONSE,
            Operation::EnableDoppelReceiver | Operation::SendDoppelMessage => {
                IS_CONFIGURED_RESPONSE
            }
            Operation::ReadDoppelMessages => READ_DOPPEL_RESPONSE,
            _ => &[],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value carried by a packet field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Fixed-width unsigned integer
    Uint(u32),
    /// Variable-length byte list
    List(Vec<u8>),
}

/// Ordered set of named field values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    fields: Vec<(&'static str, Value)>,
}

impl Packet {
    /// Create an empty packet
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Set a field, replacing any earlier value with the same name
    pub fn set(&mut self, name: &'static str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder form of [`Packet::set`] for integers
    pub fn with_uint(mut self, name: &'static str, value: u32) -> Self {
        self.set(name, Value::Uint(value));
        self
    }

    /// Builder form of [`Packet::set`] for byte lists
    pub fn with_list(mut self, name: &'static str, value: impl Into<Vec<u8>>) -> Self {
        self.set(name, Value::List(value.into()));
        self
    }

    /// Get a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Get an integer field
    pub fn uint(&self, name: &str) -> Option<u32> {
        match self.get(name) {
            Some(Value::Uint(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a byte list field
    pub fn list(&self, name: &str) -> Option<&[u8]> {
        match self.get(name) {
            Some(Value::List(v)) => Some(v),
            _ => None,
        }
    }

    /// Iterate over fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the packet has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A request addressed to one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Operation to perform
    pub operation: Operation,
    /// Request fields
    pub packet: Packet,
}

impl Request {
    /// A request with no fields
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            packet: Packet::new(),
        }
    }

    /// A request with the given fields
    pub fn with_packet(operation: Operation, packet: Packet) -> Self {
        Self { operation, packet }
    }
}

/// An acknowledged response to a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Operation this response answers
    pub operation: Operation,
    /// Response fields
    pub packet: Packet,
}

impl Response {
    /// A bare acknowledgement
    pub fn ack(operation: Operation) -> Self {
        Self {
            operation,
            packet: Packet::new(),
        }
    }

    /// A response carrying fields
    pub fn with_packet(operation: Operation, packet: Packet) -> Self {
        Self { operation, packet }
    }

    /// Required integer field
    pub fn uint(&self, name: &'static str) -> Result<u32> {
        self.packet.uint(name).ok_or(Error::MissingField {
            operation: self.operation,
            field: name,
        })
    }

    /// Required byte list field
    pub fn list(&self, name: &'static str) -> Result<&[u8]> {
        self.packet.list(name).ok_or(Error::MissingField {
            operation: self.operation,
            field: name,
        })
    }
}
