//! Chip discovery
//!
//! Finds a socket interface and prototype pin layout under which an unknown
//! chip enters programming mode, then names the chip by its signature.

use crate::chip::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::programmer::Transaction;
use crate::protocol;
use crate::session::Session;
use crate::socket::SocketInterface;

/// Try every interface/prototype pair in order
///
/// Returns the indices of the first pair under which programming-mode init
/// succeeded. Pairs that cannot be mapped onto an interface, or whose
/// configure request goes unanswered, are skipped.
fn search<T: Transaction + ?Sized>(
    link: &mut T,
    interfaces: &[SocketInterface],
    prototypes: &[DeviceDescriptor],
) -> Option<(usize, usize)> {
    for (i, interface) in interfaces.iter().enumerate() {
        for (p, prototype) in prototypes.iter().enumerate() {
            let pins = match interface.programming_pins(prototype) {
                Ok(pins) => pins,
                Err(e) => {
                    log::debug!("skipping {} on {}: {}", prototype, interface, e);
                    continue;
                }
            };

            log::debug!("trying {} on {}", prototype, interface);
            if let Err(e) = protocol::configure_chip(link, &pins) {
                log::debug!("{}", e);
                continue;
            }
            match protocol::init_programming_mode(link) {
                Ok(()) => return Some((i, p)),
                Err(e) => log::debug!("{} on {}: {}", prototype, interface, e),
            }
        }
    }
    None
}

impl<T: Transaction> Session<T> {
    /// Find a configuration that puts the installed chip in programming mode
    ///
    /// On success the interface that worked becomes the active interface and
    /// the matching prototype is returned. On failure the active interface is
    /// left unchanged. With no prototypes in the catalog nothing is sent.
    pub fn discover_configuration(&mut self) -> Option<&DeviceDescriptor> {
        let (interface, prototype) = search(
            &mut self.link,
            &self.catalog.interfaces,
            &self.catalog.prototypes,
        )?;
        self.active = interface;
        self.device = None;
        Some(&self.catalog.prototypes[prototype])
    }

    /// Discover and identify the installed chip
    ///
    /// Programming mode is entered once more with the identified device; if
    /// that fails the chip is still considered identified.
    pub fn identify(&mut self) -> Result<&DeviceDescriptor> {
        self.device = None;
        let prototype = self
            .discover_configuration()
            .ok_or(Error::NoDeviceResponded)?
            .name
            .clone();
        let interface = self.active_interface().name().to_string();
        log::debug!("chip responded as {} in {}", prototype, interface);

        let signature = protocol::read_signature(&mut self.link)?;
        let device = self
            .catalog
            .registry
            .find_by_signature(signature)
            .cloned()
            .ok_or(Error::UnknownDevice {
                interface: interface.clone(),
                signature,
            })?;
        log::info!("{} is in {}", device.name, interface);

        match protocol::init_programming_mode(&mut self.link) {
            Ok(()) => log::debug!("{} is ready to program", device.name),
            Err(e) => log::warn!("{} did not re-enter programming mode: {}", device.name, e),
        }

        Ok(&*self.device.insert(device))
    }
}
