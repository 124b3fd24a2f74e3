//! Gestalt node implementation
//!
//! This module provides the `GestaltNode` struct that frames requests for a
//! programmer node and implements the engine's `Transaction` trait on top of
//! any byte transport.

use std::time::{Duration, Instant};

use upp_core::programmer::Transaction;
use upp_core::protocol::{Request, Response};

use crate::error::{GestaltError, Result};
use crate::protocol::{self, Frame, DEFAULT_ADDRESS, HEADER_LEN, START_BYTE};
use crate::transport::Transport;

/// Attempts per transaction before giving up
pub const DEFAULT_RETRIES: u32 = 5;
/// How long to wait for a reply to one attempt
pub const DEFAULT_TIMEOUT_MS: u32 = 200;

/// A programmer node reached over a byte transport
///
/// Every request is retried until a reply arrives that carries a valid
/// checksum, comes from this node and echoes the request's port.
pub struct GestaltNode<T: Transport> {
    transport: T,
    address: u16,
    retries: u32,
    timeout_ms: u32,
}

impl<T: Transport> GestaltNode<T> {
    /// Talk to the node at [`DEFAULT_ADDRESS`] over `transport`
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            address: DEFAULT_ADDRESS,
            retries: DEFAULT_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Set the node address
    pub fn with_address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    /// Set the number of attempts per transaction (at least one)
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Set the per-attempt reply timeout
    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Node address
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Read `buf.len()` bytes before `deadline`
    fn read_until(&mut self, buf: &mut [u8], deadline: Instant) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(GestaltError::Timeout);
            }
            let ms = u32::try_from(remaining.as_millis()).unwrap_or(u32::MAX).max(1);
            filled += self.transport.read_nonblock(&mut buf[filled..], ms)?;
        }
        Ok(())
    }

    /// Receive one frame, skipping any noise before the start byte
    fn read_frame(&mut self) -> Result<Frame> {
        let deadline = Instant::now() + Duration::from_millis(u64::from(self.timeout_ms));

        let mut start = [0u8; 1];
        loop {
            self.read_until(&mut start, deadline)?;
            if start[0] == START_BYTE {
                break;
            }
            log::trace!("gestalt: skipping stray byte 0x{:02X}", start[0]);
        }

        let mut header = [0u8; HEADER_LEN];
        header[0] = START_BYTE;
        self.read_until(&mut header[1..], deadline)?;

        let mut bytes = header.to_vec();
        bytes.resize(HEADER_LEN + usize::from(header[4]) + 1, 0);
        self.read_until(&mut bytes[HEADER_LEN..], deadline)?;

        Frame::decode(&bytes)
    }

    /// One send-and-receive attempt
    fn attempt(&mut self, frame: &[u8], request: &Request) -> Result<Response> {
        self.transport.write(frame)?;
        self.transport.flush()?;

        let reply = self.read_frame()?;
        if reply.address != self.address {
            return Err(GestaltError::AddressMismatch {
                expected: self.address,
                actual: reply.address,
            });
        }
        protocol::decode_response(request.operation, &reply)
    }

    /// Perform a transaction, reporting why it failed
    ///
    /// Fails with the last attempt's error once the retry budget is spent.
    pub fn exchange(&mut self, request: &Request) -> Result<Response> {
        let frame = protocol::encode_request(self.address, request)?;
        let mut last = GestaltError::Timeout;
        for attempt in 1..=self.retries {
            match self.attempt(&frame, request) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    log::debug!(
                        "gestalt: {} attempt {}/{} failed: {}",
                        request.operation,
                        attempt,
                        self.retries,
                        e
                    );
                    last = e;
                }
            }
        }
        Err(last)
    }
}

impl<T: Transport> Transaction for GestaltNode<T> {
    fn transact(&mut self, request: &Request) -> Option<Response> {
        match self.exchange(request) {
            Ok(response) => Some(response),
            Err(e) => {
                log::warn!("gestalt: no reply to {}: {}", request.operation, e);
                None
            }
        }
    }
}
