//! Flash programming
//!
//! Program images, fuse records and the programming workflow built on the
//! node's single-transaction requests.

mod fuses;
mod image;
mod operations;

pub use fuses::{FuseUpdate, Fuses};
pub use image::{FlashImage, FlashPage, ImageError, ERASED};
pub use operations::{NoProgress, ProgramProgress};
