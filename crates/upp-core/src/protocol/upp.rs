//! Programmer node request sequences
//!
//! Each function here is exactly one transaction. Sequencing (discovery,
//! whole-image programming, the doppel session) lives in the modules that
//! build on these.

use crate::error::{ConfigError, Error, RejectReason, Result};
use crate::flash::Fuses;
use crate::programmer::Transaction;
use crate::socket::SignalMap;

use super::packets::{field, Operation, Packet, Request, Response, PROG_INIT_OK, SIGNATURE_MASK};

/// Order of the configure-chip fields on the wire
const CONFIGURE_CHIP_SIGNALS: [&str; 6] = [
    field::GND,
    field::VCC,
    field::SCK,
    field::MISO,
    field::MOSI,
    field::RESET,
];

/// Send a request and require an acknowledged response
fn exchange<T: Transaction + ?Sized>(link: &mut T, request: Request) -> Result<Response> {
    let operation = request.operation;
    log::trace!("upp: -> {} {:?}", operation, request.packet);
    match link.transact(&request) {
        Some(response) => {
            log::trace!("upp: <- {} {:?}", operation, response.packet);
            Ok(response)
        }
        None => {
            log::debug!("upp: got no response to {} request", operation);
            Err(Error::NoResponse { operation })
        }
    }
}

fn simple<T: Transaction + ?Sized>(link: &mut T, operation: Operation) -> Result<Response> {
    exchange(link, Request::new(operation))
}

fn byte_len(what: &'static str, len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| ConfigError::TooLong { what, len }.into())
}

fn require_configured(response: &Response) -> Result<()> {
    if response.uint(field::IS_CONFIGURED)? != 0 {
        Ok(())
    } else {
        Err(Error::Rejected {
            operation: response.operation,
            reason: RejectReason::NotConfigured,
        })
    }
}

/// Route the programming signals to the given internal pins
///
/// `pins` must contain `gnd`, `vcc`, `sck`, `miso`, `mosi` and `reset`.
pub fn configure_chip<T: Transaction + ?Sized>(link: &mut T, pins: &SignalMap) -> Result<()> {
    let mut packet = Packet::new();
    for signal in CONFIGURE_CHIP_SIGNALS {
        let pin = pins.get(signal).ok_or_else(|| ConfigError::MissingSignal {
            signal: signal.to_string(),
        })?;
        packet = packet.with_uint(signal, u32::from(*pin));
    }
    exchange(link, Request::with_packet(Operation::ConfigureChip, packet))?;
    Ok(())
}

/// Enter serial programming mode
///
/// Succeeds only if the device acknowledged and answered with [`PROG_INIT_OK`].
pub fn init_programming_mode<T: Transaction + ?Sized>(link: &mut T) -> Result<()> {
    let response = simple(link, Operation::ProgInit)?;
    let code = response.uint(field::RESPONSE_CODE)? as u8;
    if code == PROG_INIT_OK {
        Ok(())
    } else {
        Err(Error::Rejected {
            operation: Operation::ProgInit,
            reason: RejectReason::InitRefused { code },
        })
    }
}

/// Read the 24-bit device signature
pub fn read_signature<T: Transaction + ?Sized>(link: &mut T) -> Result<u32> {
    let response = simple(link, Operation::ReadSignature)?;
    Ok(response.uint(field::SIGNATURE_BYTES)? & SIGNATURE_MASK)
}

/// Signature the node read during its last programming session
pub fn last_known_signature<T: Transaction + ?Sized>(link: &mut T) -> Result<u32> {
    let response = simple(link, Operation::LastKnownSignature)?;
    Ok(response.uint(field::SIGNATURE_BYTES)? & SIGNATURE_MASK)
}

/// Read all three fuse bytes
pub fn read_fuses<T: Transaction + ?Sized>(link: &mut T) -> Result<Fuses> {
    let response = simple(link, Operation::ReadFuses)?;
    Ok(Fuses {
        lfuse: response.uint(field::LFUSE)? as u8,
        hfuse: response.uint(field::HFUSE)? as u8,
        efuse: response.uint(field::EFUSE)? as u8,
    })
}

/// Write all three fuse bytes
pub fn write_fuses<T: Transaction + ?Sized>(link: &mut T, fuses: &Fuses) -> Result<()> {
    let packet = Packet::new()
        .with_uint(field::LFUSE, u32::from(fuses.lfuse))
        .with_uint(field::HFUSE, u32::from(fuses.hfuse))
        .with_uint(field::EFUSE, u32::from(fuses.efuse));
    exchange(link, Request::with_packet(Operation::WriteFuses, packet))?;
    Ok(())
}

/// Erase program memory
pub fn erase_chip<T: Transaction + ?Sized>(link: &mut T) -> Result<()> {
    simple(link, Operation::EraseChip)?;
    Ok(())
}

/// Stage bytes into the device page buffer
pub fn load_page_buffer<T: Transaction + ?Sized>(
    link: &mut T,
    address: u16,
    data: &[u8],
) -> Result<()> {
    let size = byte_len("page data", data.len())?;
    let packet = Packet::new()
        .with_uint(field::DATA_SIZE, u32::from(size))
        .with_uint(field::BYTE_BASE_ADDRESS, u32::from(address))
        .with_list(field::DATA, data);
    exchange(link, Request::with_packet(Operation::LoadData, packet))?;
    Ok(())
}

/// Commit the staged page buffer to flash at `address`
pub fn commit_page<T: Transaction + ?Sized>(link: &mut T, address: u16) -> Result<()> {
    let packet = Packet::new().with_uint(field::BYTE_PAGE_ADDRESS, u32::from(address));
    exchange(link, Request::with_packet(Operation::WritePage, packet))?;
    Ok(())
}

/// Read `len` bytes of program memory starting at `address`
pub fn read_back<T: Transaction + ?Sized>(link: &mut T, address: u16, len: usize) -> Result<Vec<u8>> {
    let size = byte_len("read-back", len)?;
    let packet = Packet::new()
        .with_uint(field::DATA_SIZE, u32::from(size))
        .with_uint(field::BYTE_BASE_ADDRESS, u32::from(address));
    let response = exchange(link, Request::with_packet(Operation::ReadData, packet))?;
    Ok(response.list(field::DATA)?.to_vec())
}

/// Write one EEPROM byte without verifying it
pub fn write_eeprom_byte<T: Transaction + ?Sized>(link: &mut T, address: u8, value: u8) -> Result<()> {
    let packet = Packet::new()
        .with_uint(field::ADDRESS, u32::from(address))
        .with_uint(field::DATA, u32::from(value));
    exchange(link, Request::with_packet(Operation::WriteEeprom, packet))?;
    Ok(())
}

/// Read one EEPROM byte
pub fn read_eeprom_byte<T: Transaction + ?Sized>(link: &mut T, address: u8) -> Result<u8> {
    let packet = Packet::new().with_uint(field::ADDRESS, u32::from(address));
    let response = exchange(link, Request::with_packet(Operation::ReadEeprom, packet))?;
    Ok(response.uint(field::DATA)? as u8)
}

/// Release reset and float every socket pin except power
pub fn run_chip<T: Transaction + ?Sized>(link: &mut T) -> Result<()> {
    simple(link, Operation::RunChip)?;
    Ok(())
}

/// Sample an internal programmer pin
pub fn read_internal_pin<T: Transaction + ?Sized>(link: &mut T, pin: u8) -> Result<u8> {
    let packet = Packet::new().with_uint(field::PIN, u32::from(pin));
    let response = exchange(link, Request::with_packet(Operation::ReadInternalPin, packet))?;
    Ok(response.uint(field::VALUE)? as u8)
}

/// Assign the doppel bus to two internal pins
pub fn configure_doppel<T: Transaction + ?Sized>(link: &mut T, scl: u8, sda: u8) -> Result<()> {
    let packet = Packet::new()
        .with_uint(field::SCL_PIN, u32::from(scl))
        .with_uint(field::SDA_PIN, u32::from(sda));
    exchange(link, Request::with_packet(Operation::ConfigureDoppel, packet))?;
    Ok(())
}

/// Arm the node to buffer incoming doppel messages
pub fn enable_doppel_receiver<T: Transaction + ?Sized>(link: &mut T) -> Result<()> {
    let response = simple(link, Operation::EnableDoppelReceiver)?;
    require_configured(&response)
}

/// Send one doppel message
///
/// On the wire the frame is `[len(payload) + 1][address][payload...]`.
pub fn send_doppel_message<T: Transaction + ?Sized>(
    link: &mut T,
    address: u8,
    payload: &[u8],
) -> Result<()> {
    let length = byte_len("doppel message", payload.len() + 1)?;
    let packet = Packet::new()
        .with_uint(field::PACKET_LENGTH, u32::from(length))
        .with_uint(field::ADDRESS, u32::from(address))
        .with_list(field::MESSAGE, payload);
    let response = exchange(link, Request::with_packet(Operation::SendDoppelMessage, packet))?;
    require_configured(&response)
}

/// Fetch the raw doppel message buffer
pub fn read_doppel_buffer<T: Transaction + ?Sized>(link: &mut T) -> Result<Vec<u8>> {
    let response = simple(link, Operation::ReadDoppelMessages)?;
    Ok(response.list(field::MESSAGE)?.to_vec())
}

/// Clear the doppel message buffer
pub fn reset_doppel_buffer<T: Transaction + ?Sized>(link: &mut T) -> Result<()> {
    simple(link, Operation::ResetDoppelBuffer)?;
    Ok(())
}

/// Return the node to free-running mode
pub fn enter_free_running_mode<T: Transaction + ?Sized>(link: &mut T) -> Result<()> {
    simple(link, Operation::EnterFreeRunningMode)?;
    Ok(())
}
