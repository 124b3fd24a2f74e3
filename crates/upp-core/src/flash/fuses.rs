//! Fuse bytes

/// The three AVR fuse bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fuses {
    /// Low fuse byte
    pub lfuse: u8,
    /// High fuse byte
    pub hfuse: u8,
    /// Extended fuse byte
    pub efuse: u8,
}

/// A partial fuse assignment
///
/// Fields left as `None` keep their current value on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuseUpdate {
    /// New low fuse byte
    pub lfuse: Option<u8>,
    /// New high fuse byte
    pub hfuse: Option<u8>,
    /// New extended fuse byte
    pub efuse: Option<u8>,
}

impl FuseUpdate {
    /// Change only the low fuse
    pub fn lfuse(value: u8) -> Self {
        Self {
            lfuse: Some(value),
            ..Self::default()
        }
    }

    /// Whether no fuse is being changed
    pub fn is_empty(&self) -> bool {
        self.lfuse.is_none() && self.hfuse.is_none() && self.efuse.is_none()
    }
}

impl Fuses {
    /// Apply a partial update on top of these values
    pub fn merge(self, update: FuseUpdate) -> Self {
        Self {
            lfuse: update.lfuse.unwrap_or(self.lfuse),
            hfuse: update.hfuse.unwrap_or(self.hfuse),
            efuse: update.efuse.unwrap_or(self.efuse),
        }
    }
}
