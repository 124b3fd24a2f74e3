//! CLI command implementations
//!
//! Every command that talks to a chip runs in a fresh session, so chip
//! commands identify the chip before doing anything else.

pub mod chip;
pub mod doppel;
mod list;
pub mod program;

pub use list::{list_chips, list_interfaces, list_programmers};
