//! Program images and paging
//!
//! An image is a sparse map from byte address to value, built from Intel HEX.
//! [`FlashImage::pages`] groups it into the page-aligned, contiguous units
//! the programmer commits one at a time.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use ihex::Record;

use crate::error::ConfigError;

/// Value of an erased flash byte
pub const ERASED: u8 = 0xFF;

/// Error type for reading program images
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Malformed Intel HEX
    #[error("could not read Intel HEX: {0}")]
    Hex(#[from] ihex::ReaderError),
}

/// One programmable page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashPage {
    /// Address of the first byte
    pub address: u16,
    /// Page contents, at most one page size long
    pub data: Vec<u8>,
}

impl FlashPage {
    /// The page as (byte address, value) pairs
    pub fn bytes(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        (self.address..=u16::MAX).zip(self.data.iter().copied())
    }
}

/// A sparse program image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashImage {
    bytes: BTreeMap<u32, u8>,
}

impl FlashImage {
    /// Create an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a contiguous block of bytes at `address`
    ///
    /// Bytes that would land past the 32-bit address space are dropped.
    pub fn add_data(&mut self, address: u32, data: &[u8]) {
        for (offset, byte) in data.iter().enumerate() {
            let Some(addr) = u32::try_from(offset)
                .ok()
                .and_then(|offset| address.checked_add(offset))
            else {
                log::warn!(
                    "image: dropping {} bytes past 0xFFFFFFFF",
                    data.len() - offset
                );
                break;
            };
            self.bytes.insert(addr, *byte);
        }
    }

    /// Parse an Intel HEX string
    pub fn from_hex_str(data: &str) -> Result<Self, ImageError> {
        let mut image = Self::new();
        let mut base_address = 0u32;

        for record in ihex::Reader::new(data) {
            match record? {
                Record::Data { offset, value } => {
                    image.add_data(base_address + u32::from(offset), &value);
                }
                Record::ExtendedSegmentAddress(segment) => {
                    base_address = u32::from(segment) * 16;
                }
                Record::ExtendedLinearAddress(upper) => {
                    base_address = u32::from(upper) << 16;
                }
                Record::EndOfFile
                | Record::StartSegmentAddress { .. }
                | Record::StartLinearAddress(_) => (),
            }
        }

        log::debug!("image: {} bytes from Intel HEX", image.len());
        Ok(image)
    }

    /// Read an Intel HEX file
    pub fn load_hex_file(path: &Path) -> Result<Self, ImageError> {
        let data = fs::read_to_string(path)?;
        Self::from_hex_str(&data)
    }

    /// Number of bytes in the image
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the image holds no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Value at `address`, if the image covers it
    pub fn get(&self, address: u32) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    /// Group the image into pages of `page_size` bytes
    ///
    /// Each page starts at a multiple of `page_size` and runs up to the last
    /// image byte inside it. Holes within a page are filled with [`ERASED`].
    /// Pages come out in address order.
    pub fn pages(&self, page_size: u16) -> Result<Vec<FlashPage>, ConfigError> {
        if page_size == 0 {
            return Err(ConfigError::InvalidPageSize(page_size));
        }
        if let Some((&address, _)) = self.bytes.last_key_value() {
            if address > u32::from(u16::MAX) {
                return Err(ConfigError::AddressOutOfRange { address });
            }
        }

        let page_size = u32::from(page_size);
        let mut pages: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        for (&address, &value) in &self.bytes {
            let base = address - address % page_size;
            let data = pages.entry(base).or_default();
            // Addresses ascend, so this only ever grows the page
            data.resize((address - base) as usize, ERASED);
            data.push(value);
        }

        Ok(pages
            .into_iter()
            .map(|(base, data)| FlashPage {
                address: base as u16,
                data,
            })
            .collect())
    }
}
