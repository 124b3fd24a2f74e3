//! Programming session state
//!
//! A [`Session`] owns one connection to a programmer node together with the
//! catalog it resolves chips and sockets against. It tracks which socket
//! interface is active and which device, if any, has been identified. One
//! session per physical connection; sessions are never shared.

use crate::chip::{Catalog, DeviceDescriptor, DeviceRegistry};
use crate::error::{ConfigError, Error, Result};
use crate::programmer::Transaction;
use crate::protocol;
use crate::socket::{Pin, SocketInterface};

/// State of one programming session
pub struct Session<T: Transaction> {
    pub(crate) link: T,
    pub(crate) catalog: Catalog,
    pub(crate) active: usize,
    pub(crate) device: Option<DeviceDescriptor>,
}

impl<T: Transaction> Session<T> {
    /// Open a session over `link`
    ///
    /// The first interface in the catalog starts out active.
    pub fn new(link: T, catalog: Catalog) -> Result<Self> {
        if catalog.interfaces.is_empty() {
            return Err(ConfigError::NoInterfaces.into());
        }
        Ok(Self {
            link,
            catalog,
            active: 0,
            device: None,
        })
    }

    /// The underlying transaction primitive
    pub fn link(&mut self) -> &mut T {
        &mut self.link
    }

    /// Close the session, returning the transaction primitive
    pub fn into_link(self) -> T {
        self.link
    }

    /// The catalog this session resolves against
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Known device models
    pub fn registry(&self) -> &DeviceRegistry {
        &self.catalog.registry
    }

    /// All socket interfaces, in discovery order
    pub fn interfaces(&self) -> &[SocketInterface] {
        &self.catalog.interfaces
    }

    /// The socket interface requests are currently routed through
    pub fn active_interface(&self) -> &SocketInterface {
        &self.catalog.interfaces[self.active]
    }

    /// Make the named interface active
    ///
    /// Any identified device is forgotten, since it was found elsewhere.
    pub fn select_interface(&mut self, name: &str) -> Result<&SocketInterface> {
        let index = self
            .catalog
            .interfaces
            .iter()
            .position(|i| i.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownInterface {
                name: name.to_string(),
            })?;
        if index != self.active {
            self.device = None;
        }
        self.active = index;
        Ok(&self.catalog.interfaces[index])
    }

    /// The device found by discovery
    pub fn identified_device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    /// The device found by discovery, or [`Error::NotIdentified`]
    pub fn device(&self) -> Result<&DeviceDescriptor> {
        self.device.as_ref().ok_or(Error::NotIdentified)
    }

    /// Signature the node read during its last programming session
    pub fn last_known_signature(&mut self) -> Result<u32> {
        protocol::last_known_signature(&mut self.link)
    }

    /// The device to resolve pins against
    ///
    /// Falls back to the node's last-known signature when nothing has been
    /// identified in this session, e.g. once the chip is running.
    pub(crate) fn resolve_device(&mut self) -> Result<DeviceDescriptor> {
        if let Some(device) = &self.device {
            return Ok(device.clone());
        }
        let signature = self.last_known_signature()?;
        self.catalog
            .registry
            .find_by_signature(signature)
            .cloned()
            .ok_or_else(|| Error::UnknownDevice {
                interface: self.active_interface().name().to_string(),
                signature,
            })
    }

    /// Internal pin carrying `signal` on the active interface
    ///
    /// Hardwired signals resolve without a device. Anything else needs one,
    /// see [`Session::resolve_device`].
    pub(crate) fn resolve_signal(&mut self, signal: &str) -> Result<u8> {
        match self
            .active_interface()
            .signal_pin(signal, self.device.as_ref())
        {
            Err(ConfigError::SignalNeedsDevice { .. }) => {
                let device = self.resolve_device()?;
                Ok(self.active_interface().signal_pin(signal, Some(&device))?)
            }
            other => Ok(other?),
        }
    }

    /// Sample an internal programmer pin
    pub fn read_internal_pin(&mut self, pin: u8) -> Result<u8> {
        protocol::read_internal_pin(&mut self.link, pin)
    }

    /// Sample a pin of the chip in the active socket
    ///
    /// A numbered pin is a package pin of the chip; a named pin is a signal.
    pub fn read_chip_pin(&mut self, pin: &Pin) -> Result<u8> {
        let internal = match pin {
            Pin::Numbered(package_pin) => {
                let device = self.resolve_device()?;
                self.active_interface()
                    .socket_position(&device, *package_pin)?
            }
            Pin::Named(signal) => self.resolve_signal(signal)?,
        };
        log::debug!("chip pin {} is internal pin {}", pin, internal);
        self.read_internal_pin(internal)
    }
}
