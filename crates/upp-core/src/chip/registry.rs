//! Registry of known device models

use super::types::DeviceDescriptor;
use crate::error::ConfigError;

/// Known device models, searched by signature
///
/// Lookup returns the first registered descriptor with a matching signature,
/// so registering a duplicate signature never shadows an earlier entry.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Add a device model
    ///
    /// Prototypes (descriptors without a signature) cannot be registered.
    pub fn register(&mut self, device: DeviceDescriptor) -> Result<(), ConfigError> {
        let Some(signature) = device.signature else {
            return Err(ConfigError::MissingSignature {
                device: device.name,
            });
        };
        if let Some(existing) = self.find_by_signature(signature) {
            log::warn!(
                "{} has the same signature 0x{:06X} as {}; lookups will keep returning {}",
                device.name,
                signature,
                existing.name,
                existing.name
            );
        }
        self.devices.push(device);
        Ok(())
    }

    /// First registered device with the given signature
    pub fn find_by_signature(&self, signature: u32) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.signature == Some(signature))
    }

    /// Device by exact name, ignoring case
    pub fn find_by_name(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.devices
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// All registered devices, in registration order
    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate over registered devices
    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_signature() {
        let mut registry = DeviceRegistry::new();
        registry
            .register(DeviceDescriptor::new("ATTiny44").with_signature(0x07921E))
            .unwrap();
        registry
            .register(DeviceDescriptor::new("ATMega328").with_signature(0x0F951E))
            .unwrap();

        assert_eq!(registry.find_by_signature(0x0F951E).unwrap().name, "ATMega328");
        assert!(registry.find_by_signature(0x123456).is_none());
        assert_eq!(registry.find_by_name("attiny44").unwrap().signature, Some(0x07921E));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = DeviceRegistry::new();
        registry
            .register(DeviceDescriptor::new("first").with_signature(0x0B931E))
            .unwrap();
        registry
            .register(DeviceDescriptor::new("second").with_signature(0x0B931E))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_by_signature(0x0B931E).unwrap().name, "first");
    }

    #[test]
    fn test_prototype_cannot_be_registered() {
        let mut registry = DeviceRegistry::new();
        let err = registry
            .register(DeviceDescriptor::new("attiny_8pin"))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingSignature {
                device: "attiny_8pin".into()
            }
        );
        assert!(registry.is_empty());
    }
}
