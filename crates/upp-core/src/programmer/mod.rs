//! Programmer abstraction
//!
//! This module provides the [`Transaction`] trait that programmer backends
//! implement to carry requests to the node.

mod traits;

pub use traits::Transaction;
