//! upp-core - Device programming engine for the UPP programmer
//!
//! This crate drives an in-circuit AVR programmer node over a blocking
//! request/response link. It provides:
//! - Socket pin geometry and signal resolution
//! - A device registry and RON catalog of known chips and sockets
//! - Chip discovery across socket interfaces and pin layouts
//! - Page-oriented flash programming with verification, fuses and EEPROM
//! - The doppel message relay
//!
//! The byte-level transport lives in other crates; they plug in through
//! [`programmer::Transaction`].

pub mod chip;
pub mod discovery;
pub mod doppel;
pub mod error;
pub mod flash;
pub mod programmer;
pub mod protocol;
pub mod session;
pub mod socket;

pub use error::{Error, Result};
pub use session::Session;
