//! Gestalt wire format
//!
//! Every frame, in both directions:
//!
//! ```text
//! [0x48][address lo][address hi][port][length][payload ...][crc]
//! ```
//!
//! The CRC is CRC-8/SMBUS over every preceding byte. The payload is the
//! operation's field template in order: integers little-endian at their
//! catalogued width, and a byte list taking the rest of the payload.

use crc::{Crc, CRC_8_SMBUS};
use upp_core::protocol::{FieldKind, Operation, Packet, Request, Response, Value};

use crate::error::{GestaltError, Result};

/// First byte of every frame
pub const START_BYTE: u8 = 0x48;
/// Bytes before the payload
pub const HEADER_LEN: usize = 5;
/// Largest payload the length byte can describe
pub const MAX_PAYLOAD: usize = u8::MAX as usize;
/// Node address used when none is configured
pub const DEFAULT_ADDRESS: u16 = 1;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Checksum of a frame's leading bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    CRC8.checksum(bytes)
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Node address
    pub address: u16,
    /// Port on the node
    pub port: u8,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// Serialize with header and checksum
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = u8::try_from(self.payload.len())
            .map_err(|_| GestaltError::PayloadTooLong(self.payload.len()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len() + 1);
        bytes.push(START_BYTE);
        bytes.extend_from_slice(&self.address.to_le_bytes());
        bytes.push(self.port);
        bytes.push(len);
        bytes.extend_from_slice(&self.payload);
        bytes.push(checksum(&bytes));
        Ok(bytes)
    }

    /// Parse a complete frame
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = bytes.get(..HEADER_LEN).ok_or(GestaltError::Truncated("header"))?;
        if header[0] != START_BYTE {
            return Err(GestaltError::BadStart(header[0]));
        }
        let len = usize::from(header[4]);
        let body_end = HEADER_LEN + len;
        let actual = *bytes.get(body_end).ok_or(GestaltError::Truncated("frame"))?;
        let expected = checksum(&bytes[..body_end]);
        if actual != expected {
            return Err(GestaltError::CrcMismatch { expected, actual });
        }
        Ok(Self {
            address: u16::from_le_bytes([header[1], header[2]]),
            port: header[3],
            payload: bytes[HEADER_LEN..body_end].to_vec(),
        })
    }
}

/// Serialize a packet against a field template
pub fn encode_payload(fields: &[upp_core::protocol::Field], packet: &Packet) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    for field in fields {
        let value = packet
            .get(field.name)
            .ok_or(GestaltError::MissingField(field.name))?;
        match (field.kind, value) {
            (FieldKind::Uint(width), Value::Uint(v)) => {
                let width = usize::from(width);
                if width < 4 && *v >> (8 * width) != 0 {
                    return Err(GestaltError::FieldOverflow {
                        field: field.name,
                        value: *v,
                    });
                }
                payload.extend_from_slice(&v.to_le_bytes()[..width]);
            }
            (FieldKind::List, Value::List(bytes)) => payload.extend_from_slice(bytes),
            _ => {
                return Err(GestaltError::InvalidParameter(format!(
                    "field '{}' has the wrong kind",
                    field.name
                )))
            }
        }
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(GestaltError::PayloadTooLong(payload.len()));
    }
    Ok(payload)
}

/// Parse a payload against a field template
pub fn decode_payload(fields: &'static [upp_core::protocol::Field], payload: &[u8]) -> Result<Packet> {
    let mut packet = Packet::new();
    let mut rest = payload;
    for field in fields {
        match field.kind {
            FieldKind::Uint(width) => {
                let width = usize::from(width);
                if rest.len() < width {
                    return Err(GestaltError::Truncated(field.name));
                }
                let (bytes, tail) = rest.split_at(width);
                let mut le = [0u8; 4];
                le[..width].copy_from_slice(bytes);
                packet.set(field.name, Value::Uint(u32::from_le_bytes(le)));
                rest = tail;
            }
            FieldKind::List => {
                packet.set(field.name, Value::List(rest.to_vec()));
                rest = &[];
            }
        }
    }
    Ok(packet)
}

/// Build the frame for a request
pub fn encode_request(address: u16, request: &Request) -> Result<Vec<u8>> {
    let payload = encode_payload(request.operation.request_fields(), &request.packet)?;
    Frame {
        address,
        port: request.operation.port(),
        payload,
    }
    .encode()
}

/// Interpret a reply frame as the response to `operation`
pub fn decode_response(operation: Operation, frame: &Frame) -> Result<Response> {
    if frame.port != operation.port() {
        return Err(GestaltError::PortMismatch {
            expected: operation.port(),
            actual: frame.port,
        });
    }
    let packet = decode_payload(operation.response_fields(), &frame.payload)?;
    Ok(Response::with_packet(operation, packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_core::protocol::field;

    #[test]
    fn test_frame_layout() {
        let request = Request::with_packet(
            Operation::WritePage,
            Packet::new().with_uint(field::BYTE_PAGE_ADDRESS, 0x0140),
        );
        let bytes = encode_request(0x0201, &request).unwrap();

        assert_eq!(&bytes[..7], &[0x48, 0x01, 0x02, 17, 2, 0x40, 0x01]);
        assert_eq!(bytes[7], checksum(&bytes[..7]));
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn test_crc8_smbus_check_value() {
        assert_eq!(checksum(b"123456789"), 0xF4);
    }

    #[test]
    fn test_corrupt_frame_is_rejected() {
        let mut bytes = Frame {
            address: 1,
            port: 12,
            payload: vec![0x1E, 0x95, 0x0F, 0x00],
        }
        .encode()
        .unwrap();
        bytes[6] ^= 0x01;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(GestaltError::CrcMismatch { .. })
        ));
        assert!(matches!(
            Frame::decode(&bytes[..4]),
            Err(GestaltError::Truncated(_))
        ));
        assert!(matches!(
            Frame::decode(&[0x00, 0, 0, 0, 0, 0]),
            Err(GestaltError::BadStart(0x00))
        ));
    }

    #[test]
    fn test_signature_response_decodes_little_endian() {
        let frame = Frame {
            address: 1,
            port: Operation::ReadSignature.port(),
            payload: vec![0x1E, 0x95, 0x0F, 0xAB],
        };
        let response = decode_response(Operation::ReadSignature, &frame).unwrap();
        assert_eq!(response.uint(field::SIGNATURE_BYTES).unwrap(), 0xAB0F_951E);

        assert!(matches!(
            decode_response(Operation::ReadFuses, &frame),
            Err(GestaltError::PortMismatch { .. })
        ));
    }

    #[test]
    fn test_list_field_takes_remaining_payload() {
        let request = Request::with_packet(
            Operation::SendDoppelMessage,
            Packet::new()
                .with_uint(field::PACKET_LENGTH, 4)
                .with_uint(field::ADDRESS, 9)
                .with_list(field::MESSAGE, vec![1, 2, 3]),
        );
        let bytes = encode_request(1, &request).unwrap();
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload, vec![4, 9, 1, 2, 3]);

        let packet = decode_payload(Operation::SendDoppelMessage.request_fields(), &frame.payload)
            .unwrap();
        assert_eq!(packet, request.packet);
    }

    #[test]
    fn test_field_overflow() {
        let request = Request::with_packet(
            Operation::ReadEeprom,
            Packet::new().with_uint(field::ADDRESS, 256),
        );
        assert!(matches!(
            encode_request(1, &request),
            Err(GestaltError::FieldOverflow { .. })
        ));
        assert!(matches!(
            encode_request(1, &Request::new(Operation::ReadEeprom)),
            Err(GestaltError::MissingField("address"))
        ));
    }
}
