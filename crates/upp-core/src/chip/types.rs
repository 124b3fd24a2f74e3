//! Target device type definitions

use std::collections::BTreeMap;

/// The programming signals every ISP-capable device exposes
pub const ROLE_SIGNALS: [&str; 6] = ["vcc", "gnd", "mosi", "miso", "sck", "reset"];

/// Physical pin layout of a device package
///
/// All pin numbers are *package* pin numbers (1-based, as printed in the
/// datasheet pinout), not socket pins.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct PackageLayout {
    /// Number of pins in the package
    pub pin_count: Option<u8>,
    /// Supply pin
    pub vcc: Option<u8>,
    /// Ground pin
    pub gnd: Option<u8>,
    /// SPI MOSI pin
    pub mosi: Option<u8>,
    /// SPI MISO pin
    pub miso: Option<u8>,
    /// SPI clock pin
    pub sck: Option<u8>,
    /// Reset pin
    pub reset: Option<u8>,
    /// Any other named pins (e.g. port pins like `PB0`)
    pub io_pins: BTreeMap<String, u8>,
}

impl PackageLayout {
    /// Package pin of one of the [`ROLE_SIGNALS`]
    pub fn role_pin(&self, signal: &str) -> Option<u8> {
        match signal {
            "vcc" => self.vcc,
            "gnd" => self.gnd,
            "mosi" => self.mosi,
            "miso" => self.miso,
            "sck" => self.sck,
            "reset" => self.reset,
            _ => None,
        }
    }

    /// Package pin carrying `signal`, either a role pin or a named I/O pin
    pub fn package_pin(&self, signal: &str) -> Option<u8> {
        self.role_pin(signal)
            .or_else(|| self.io_pins.get(signal).copied())
    }
}

/// Description of one target device model
///
/// Descriptors without a signature are prototypes: generic package layouts
/// used only to establish communication during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Device name (e.g. "ATTiny44")
    pub name: String,
    /// 24-bit device signature
    pub signature: Option<u32>,
    /// Flash page size in bytes
    pub page_size: Option<u16>,
    /// Package pin layout
    pub layout: PackageLayout,
}

impl DeviceDescriptor {
    /// Create a descriptor with no signature, page size or pins
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: None,
            page_size: None,
            layout: PackageLayout::default(),
        }
    }

    /// Set the device signature
    pub fn with_signature(mut self, signature: u32) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Set the flash page size
    pub fn with_page_size(mut self, page_size: u16) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Set the package layout
    pub fn with_layout(mut self, layout: PackageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Whether this is a discovery prototype (no signature)
    pub fn is_prototype(&self) -> bool {
        self.signature.is_none()
    }

    /// Number of package pins
    pub fn pin_count(&self) -> Option<u8> {
        self.layout.pin_count
    }

    /// Package pin carrying `signal`
    pub fn package_pin(&self, signal: &str) -> Option<u8> {
        self.layout.package_pin(signal)
    }
}

impl core::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}
