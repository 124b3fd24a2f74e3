//! Target device types, registry and catalog
//!
//! This module describes target chips by signature and package layout, and
//! loads the catalog of known chips, discovery prototypes and socket
//! interfaces from RON files.

mod database;
mod registry;
mod types;

pub use database::*;
pub use registry::DeviceRegistry;
pub use types::*;
