//! Device catalog for runtime loading
//!
//! A catalog file describes package layouts, the discovery prototypes built
//! from them, the known device models and the programmer's socket interfaces.
//! The default catalog is compiled in from `chips/avr.ron`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use super::registry::DeviceRegistry;
use super::types::{DeviceDescriptor, PackageLayout};
use crate::socket::SocketInterface;

const BUILTIN_CATALOG: &str = include_str!("../../chips/avr.ron");

/// Error type for catalog loading
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Validation error
    #[error("validation error: {0}")]
    Validation(String),
}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

#[derive(Debug, serde::Deserialize)]
struct DeviceDef {
    name: String,
    signature: Option<u32>,
    #[serde(default)]
    page_size: Option<u16>,
    #[serde(default)]
    package: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct InterfaceDef {
    name: String,
    #[serde(default)]
    pin_count: Option<u8>,
    #[serde(default)]
    custom_mapping: Option<Vec<u8>>,
    #[serde(default)]
    signal_pins: BTreeMap<String, u8>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CatalogDef {
    packages: BTreeMap<String, PackageLayout>,
    prototypes: Vec<String>,
    devices: Vec<DeviceDef>,
    interfaces: Vec<InterfaceDef>,
}

// ============================================================================
// Catalog
// ============================================================================

/// Everything the engine needs to know about targets and sockets
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Known device models
    pub registry: DeviceRegistry,
    /// Generic package layouts tried during discovery, in order
    pub prototypes: Vec<DeviceDescriptor>,
    /// Socket interfaces searched during discovery, in order
    pub interfaces: Vec<SocketInterface>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled-in AVR catalog
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        catalog.load_ron(BUILTIN_CATALOG)?;
        Ok(catalog)
    }

    /// Load catalog entries from a single RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, CatalogError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load catalog entries from a RON string
    ///
    /// Entries are appended after anything already loaded. Returns the number
    /// of devices added to the registry.
    pub fn load_ron(&mut self, content: &str) -> Result<usize, CatalogError> {
        let def: CatalogDef = ron::from_str(content)?;

        let package = |name: &str| {
            def.packages.get(name).cloned().ok_or_else(|| {
                CatalogError::Validation(format!("unknown package '{}'", name))
            })
        };

        let mut prototypes = Vec::with_capacity(def.prototypes.len());
        for name in &def.prototypes {
            prototypes.push(DeviceDescriptor::new(name.as_str()).with_layout(package(name)?));
        }

        let mut devices = Vec::with_capacity(def.devices.len());
        for dev in &def.devices {
            let mut device = DeviceDescriptor::new(dev.name.as_str());
            device.signature = dev.signature;
            device.page_size = dev.page_size;
            if let Some(pkg) = &dev.package {
                device.layout = package(pkg)?;
            }
            if let Some(signature) = device.signature.filter(|&s| s > 0xFF_FFFF) {
                return Err(CatalogError::Validation(format!(
                    "{} has a signature wider than three bytes: 0x{:X}",
                    device.name, signature
                )));
            }
            if device.page_size == Some(0) {
                return Err(CatalogError::Validation(format!(
                    "{} has a page size of zero",
                    device.name
                )));
            }
            devices.push(device);
        }

        let mut interfaces = Vec::with_capacity(def.interfaces.len());
        for iface in def.interfaces {
            let interface = SocketInterface::new(
                iface.name,
                iface.pin_count,
                iface.custom_mapping,
                iface.signal_pins,
            )
            .map_err(|e| CatalogError::Validation(e.to_string()))?;
            interfaces.push(interface);
        }

        // Validate everything before touching self so a bad file adds nothing
        let mut registry = self.registry.clone();
        let count = devices.len();
        for device in devices {
            registry
                .register(device)
                .map_err(|e| CatalogError::Validation(e.to_string()))?;
        }

        self.registry = registry;
        self.prototypes.extend(prototypes);
        self.interfaces.extend(interfaces);
        Ok(count)
    }

    /// Load all RON files from a directory
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, CatalogError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ron") {
                paths.push(path);
            }
        }
        // Registration order decides signature precedence
        paths.sort();

        let mut total = 0;
        for path in paths {
            total += self.load_file(&path)?;
        }
        Ok(total)
    }

    /// Interface by name, ignoring case
    pub fn find_interface(&self, name: &str) -> Option<&SocketInterface> {
        self.interfaces
            .iter()
            .find(|i| i.name().eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog() {
        let catalog = Catalog::builtin().unwrap();

        assert_eq!(catalog.registry.len(), 9);
        assert_eq!(catalog.prototypes.len(), 3);
        assert_eq!(catalog.interfaces.len(), 2);

        let tiny44 = catalog.registry.find_by_signature(0x07921E).unwrap();
        assert_eq!(tiny44.name, "ATTiny44");
        assert_eq!(tiny44.page_size, Some(64));
        assert_eq!(tiny44.pin_count(), Some(14));
        assert_eq!(tiny44.package_pin("PA7"), Some(6));

        let mega = catalog.registry.find_by_signature(0x0F951E).unwrap();
        assert_eq!(mega.name, "ATMega328");
        assert_eq!(mega.pin_count(), None);

        let tiny2313 = catalog.registry.find_by_name("ATTiny2313").unwrap();
        assert_eq!(tiny2313.page_size, None);

        assert_eq!(catalog.prototypes[0].name, "attiny_8pin");
        assert!(catalog.prototypes.iter().all(|p| p.is_prototype()));

        let cable = catalog.find_interface("external isp cable").unwrap();
        assert_eq!(cable.pin_count(), None);
        assert_eq!(cable.signal_pins()["reset"], 28);
    }

    #[test]
    fn test_load_ron_minimal() {
        let ron = r#"
        #![enable(implicit_some)]
        (
            packages: {
                "dip8": (pin_count: 8, gnd: 4, vcc: 8, sck: 7, miso: 6, mosi: 5, reset: 1),
            },
            devices: [
                (name: "Widget", signature: 0x123456, page_size: 16, package: "dip8"),
            ],
        )
        "#;

        let mut catalog = Catalog::new();
        assert_eq!(catalog.load_ron(ron).unwrap(), 1);
        let widget = catalog.registry.find_by_signature(0x123456).unwrap();
        assert_eq!(widget.package_pin("sck"), Some(7));
        assert!(catalog.interfaces.is_empty());
    }

    #[test]
    fn test_unknown_package_is_rejected() {
        let ron = r#"
        #![enable(implicit_some)]
        (devices: [(name: "Widget", signature: 1, package: "nope")])
        "#;
        let mut catalog = Catalog::new();
        assert!(matches!(
            catalog.load_ron(ron),
            Err(CatalogError::Validation(_))
        ));
        assert!(catalog.registry.is_empty());
    }

    #[test]
    fn test_device_without_signature_is_rejected() {
        let ron = r#"(devices: [(name: "Widget", signature: None)])"#;
        let mut catalog = Catalog::new();
        assert!(matches!(
            catalog.load_ron(ron),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_wide_signature_is_rejected() {
        let ron = r#"
        #![enable(implicit_some)]
        (devices: [(name: "Bad", signature: 0x1000000)])
        "#;
        let mut catalog = Catalog::builtin().unwrap();
        let before = catalog.registry.len();
        assert!(matches!(
            catalog.load_ron(ron),
            Err(CatalogError::Validation(_))
        ));
        assert_eq!(catalog.registry.len(), before);
        assert!(catalog.registry.find_by_name("Bad").is_none());
    }

    #[test]
    fn test_short_mapping_is_rejected() {
        let ron = r#"
        #![enable(implicit_some)]
        (interfaces: [(name: "bad", pin_count: 4, custom_mapping: [1, 2])])
        "#;
        let mut catalog = Catalog::new();
        assert!(matches!(
            catalog.load_ron(ron),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_load_dir_keeps_first_signature() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, device: &str| {
            let mut f = fs::File::create(dir.path().join(name)).unwrap();
            write!(
                f,
                "#![enable(implicit_some)]\n(devices: [(name: \"{}\", signature: 0x0B931E)])",
                device
            )
            .unwrap();
        };
        write("a.ron", "Alpha");
        write("b.ron", "Beta");
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut catalog = Catalog::new();
        assert_eq!(catalog.load_dir(dir.path()).unwrap(), 2);
        assert_eq!(catalog.registry.find_by_signature(0x0B931E).unwrap().name, "Alpha");
    }
}
