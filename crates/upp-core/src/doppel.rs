//! Doppel message relay
//!
//! The doppel bus is a two-wire side channel between the programmer and the
//! running chip. The node buffers incoming frames of the form
//! `[length][length bytes]`; the host fetches the whole buffer at once and
//! splits it with [`decode_messages`].

use crate::error::Result;
use crate::programmer::Transaction;
use crate::protocol;
use crate::session::Session;
use crate::socket::{Pin, DOPPEL_SCL, DOPPEL_SDA};

/// Split a raw doppel buffer into messages
///
/// Decoding stops at a zero length byte or at a frame that runs past the end
/// of the buffer; only complete messages before that point are returned.
pub fn decode_messages(buffer: &[u8]) -> Vec<Vec<u8>> {
    let mut messages = Vec::new();
    let mut rest = buffer;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len);
        if len == 0 || tail.len() < len {
            break;
        }
        let (body, next) = tail.split_at(len);
        messages.push(body.to_vec());
        rest = next;
    }
    messages
}

/// Doppel session layered on a programming session
///
/// Obtained from [`Session::doppel`]. Pins resolve against the session's
/// active interface and device.
pub struct DoppelRelay<'a, T: Transaction> {
    session: &'a mut Session<T>,
}

impl<T: Transaction> Session<T> {
    /// Talk to the doppel bus through this session
    pub fn doppel(&mut self) -> DoppelRelay<'_, T> {
        DoppelRelay { session: self }
    }
}

impl<T: Transaction> DoppelRelay<'_, T> {
    fn bus_pin(&mut self, pin: &Pin) -> Result<u8> {
        match pin {
            Pin::Numbered(internal) => Ok(*internal),
            Pin::Named(signal) => self.session.resolve_signal(signal),
        }
    }

    /// Assign the bus to two pins
    ///
    /// A numbered pin is an internal programmer pin. A named pin is a signal
    /// resolved on the active interface. Unless both pins are given, the bus
    /// goes on the interface's `doppelscl` / `doppelsda`.
    ///
    /// Returns the internal (scl, sda) pins that were configured.
    pub fn configure(&mut self, scl: Option<&Pin>, sda: Option<&Pin>) -> Result<(u8, u8)> {
        let (scl, sda) = match (scl, sda) {
            (Some(scl), Some(sda)) => (self.bus_pin(scl)?, self.bus_pin(sda)?),
            (scl, sda) => {
                if scl.is_some() || sda.is_some() {
                    log::warn!("doppel: both pins are needed, using the interface defaults");
                }
                (
                    self.session.resolve_signal(DOPPEL_SCL)?,
                    self.session.resolve_signal(DOPPEL_SDA)?,
                )
            }
        };
        protocol::configure_doppel(&mut self.session.link, scl, sda)?;
        log::debug!("doppel bus on scl={} sda={}", scl, sda);
        Ok((scl, sda))
    }

    /// Start buffering incoming messages
    pub fn enable_receiver(&mut self) -> Result<()> {
        protocol::enable_doppel_receiver(&mut self.session.link)
    }

    /// Send one message to `address`
    pub fn send_message(&mut self, address: u8, payload: &[u8]) -> Result<()> {
        protocol::send_doppel_message(&mut self.session.link, address, payload)?;
        log::debug!("doppel: sent {} bytes to {}", payload.len(), address);
        Ok(())
    }

    /// Fetch and decode all buffered messages
    pub fn read_messages(&mut self) -> Result<Vec<Vec<u8>>> {
        let buffer = protocol::read_doppel_buffer(&mut self.session.link)?;
        let messages = decode_messages(&buffer);
        log::debug!(
            "doppel: {} messages in {} buffered bytes",
            messages.len(),
            buffer.len()
        );
        Ok(messages)
    }

    /// Clear the node's message buffer
    pub fn reset_message_buffer(&mut self) -> Result<()> {
        protocol::reset_doppel_buffer(&mut self.session.link)
    }

    /// Leave the doppel session
    pub fn enter_free_running_mode(&mut self) -> Result<()> {
        protocol::enter_free_running_mode(&mut self.session.link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{Catalog, DeviceDescriptor, PackageLayout};
    use crate::error::Error;
    use crate::protocol::{field, Operation, Packet, Request, Response};
    use crate::socket::SocketInterface;

    #[test]
    fn test_decode_two_frames() {
        assert_eq!(
            decode_messages(&[3, 10, 20, 30, 2, 1, 2]),
            vec![vec![10, 20, 30], vec![1, 2]]
        );
    }

    #[test]
    fn test_decode_truncated_frame() {
        assert!(decode_messages(&[5, 1, 2]).is_empty());
        assert_eq!(decode_messages(&[1, 7, 4, 1]), vec![vec![7]]);
    }

    #[test]
    fn test_decode_stops_at_zero_length() {
        assert_eq!(decode_messages(&[1, 9, 0, 1, 5]), vec![vec![9]]);
        assert!(decode_messages(&[]).is_empty());
    }

    /// Records doppel requests; last-known signature is an ATTiny85
    #[derive(Default)]
    struct Bus {
        configured: Option<(u32, u32)>,
        buffer: Vec<u8>,
        sent: Vec<Operation>,
    }

    impl Transaction for Bus {
        fn transact(&mut self, request: &Request) -> Option<Response> {
            let op = request.operation;
            self.sent.push(op);
            let is_configured = u32::from(self.configured.is_some());
            let reply = match op {
                Operation::ConfigureDoppel => {
                    self.configured = Some((
                        request.packet.uint(field::SCL_PIN)?,
                        request.packet.uint(field::SDA_PIN)?,
                    ));
                    Packet::new()
                }
                Operation::EnableDoppelReceiver | Operation::SendDoppelMessage => {
                    Packet::new().with_uint(field::IS_CONFIGURED, is_configured)
                }
                Operation::ReadDoppelMessages => {
                    Packet::new().with_list(field::MESSAGE, self.buffer.clone())
                }
                Operation::ResetDoppelBuffer => {
                    self.buffer.clear();
                    Packet::new()
                }
                Operation::LastKnownSignature => {
                    Packet::new().with_uint(field::SIGNATURE_BYTES, 0x0B931E)
                }
                _ => Packet::new(),
            };
            Some(Response::with_packet(op, reply))
        }
    }

    fn session() -> Session<Bus> {
        let mut catalog = Catalog::new();
        catalog.interfaces.push(
            SocketInterface::new("ZIF SOCKET", Some(20), None, [("doppelscl", 19u8), ("doppelsda", 18)])
                .unwrap(),
        );
        catalog
            .registry
            .register(
                DeviceDescriptor::new("ATTiny85")
                    .with_signature(0x0B931E)
                    .with_layout(PackageLayout {
                        pin_count: Some(8),
                        io_pins: [("PB3".to_string(), 2), ("PB0".to_string(), 5)]
                            .into_iter()
                            .collect(),
                        ..Default::default()
                    }),
            )
            .unwrap();
        Session::new(Bus::default(), catalog).unwrap()
    }

    #[test]
    fn test_configure_defaults_to_hardwired_pins() {
        let mut session = session();
        assert_eq!(session.doppel().configure(None, None).unwrap(), (19, 18));
        assert_eq!(session.link().configured, Some((19, 18)));
        // Hardwired pins need no device lookup
        assert_eq!(session.link().sent, vec![Operation::ConfigureDoppel]);
    }

    #[test]
    fn test_configure_mixed_pins() {
        let mut session = session();
        let scl = Pin::Numbered(7);
        let sda = Pin::Named("PB0".into());
        assert_eq!(
            session.doppel().configure(Some(&scl), Some(&sda)).unwrap(),
            (7, 17)
        );
        assert_eq!(
            session.link().sent,
            vec![Operation::LastKnownSignature, Operation::ConfigureDoppel]
        );

        // A lone pin is not enough; both come from the interface
        let sda = Pin::Named("PB3".into());
        assert_eq!(session.doppel().configure(None, Some(&sda)).unwrap(), (19, 18));
        assert_eq!(
            session.doppel().configure(Some(&Pin::Numbered(5)), None).unwrap(),
            (19, 18)
        );
        assert_eq!(session.link().configured, Some((19, 18)));
    }

    #[test]
    fn test_unconfigured_bus_fails_logically() {
        let mut session = session();
        let mut relay = session.doppel();
        assert!(matches!(relay.enable_receiver(), Err(Error::Rejected { .. })));
        assert!(relay.send_message(1, &[1, 2]).is_err());

        relay.configure(None, None).unwrap();
        relay.enable_receiver().unwrap();
        relay.send_message(1, &[1, 2]).unwrap();
    }

    #[test]
    fn test_read_and_reset_buffer() {
        let mut session = session();
        session.link().buffer = vec![3, 10, 20, 30, 2, 1, 2, 9, 1];

        let mut relay = session.doppel();
        assert_eq!(
            relay.read_messages().unwrap(),
            vec![vec![10, 20, 30], vec![1, 2]]
        );
        relay.reset_message_buffer().unwrap();
        assert!(relay.read_messages().unwrap().is_empty());
        relay.enter_free_running_mode().unwrap();
    }
}
