//! Protocol implementations
//!
//! This module contains the wire catalog of the programmer node and the
//! single-transaction request sequences built on it.

mod packets;
mod upp;

pub use packets::*;
pub use upp::*;
