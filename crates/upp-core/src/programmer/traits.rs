//! Programmer trait definitions
//!
//! The engine talks to the programmer node through a single blocking
//! request/response primitive. Implementations own the byte encoding, the
//! retry policy and any timeouts; the engine only observes whether an
//! acknowledged response arrived.

use crate::protocol::{Request, Response};

/// Request/response transaction primitive
///
/// `transact` transmits `request` and retries until either a well-formed
/// response arrives or the implementation's retry budget runs out, in which
/// case it returns `None`. Only one transaction may be in flight per
/// connection; `&mut self` enforces that.
///
/// The returned response's fields follow
/// [`Operation::response_fields`](crate::protocol::Operation::response_fields)
/// for `request.operation`.
pub trait Transaction {
    /// Perform one transaction
    fn transact(&mut self, request: &Request) -> Option<Response>;
}

impl<T: Transaction + ?Sized> Transaction for &mut T {
    fn transact(&mut self, request: &Request) -> Option<Response> {
        (**self).transact(request)
    }
}

impl<T: Transaction + ?Sized> Transaction for Box<T> {
    fn transact(&mut self, request: &Request) -> Option<Response> {
        (**self).transact(request)
    }
}
