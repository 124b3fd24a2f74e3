//! Socket interfaces and pin geometry
//!
//! A socket interface is a physical connector on the programmer: the onboard
//! ZIF socket, an external ISP cable, and so on. Pins are numbered three ways:
//!
//! - *package pins*, as printed on the target chip's pinout
//! - *socket pins*, the position on the connector
//! - *internal pins*, the programmer's own numbering after any custom remapping
//!
//! Chips are seated left-justified with pin 1 at the socket's lower left.
//! Pins on the chip's left side therefore line up with the socket by position,
//! while pins on its right side are counted back from the socket's far end.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use crate::chip::{DeviceDescriptor, ROLE_SIGNALS};
use crate::error::ConfigError;

/// Mapping from signal name to internal pin number
pub type SignalMap = BTreeMap<String, u8>;

/// Signals resolved when building a configure-chip request
pub const DEFAULT_SIGNALS: [&str; 6] = ROLE_SIGNALS;

/// Hardwired doppel clock signal
pub const DOPPEL_SCL: &str = "doppelscl";
/// Hardwired doppel data signal
pub const DOPPEL_SDA: &str = "doppelsda";

/// A pin given either by number or by signal name
///
/// What a number means depends on where the pin is used; see the operation
/// taking it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pin {
    /// A pin number
    Numbered(u8),
    /// A signal name, resolved against an interface and device
    Named(String),
}

impl From<u8> for Pin {
    fn from(pin: u8) -> Self {
        Pin::Numbered(pin)
    }
}

impl From<&str> for Pin {
    fn from(signal: &str) -> Self {
        Pin::Named(signal.to_string())
    }
}

impl From<String> for Pin {
    fn from(signal: String) -> Self {
        Pin::Named(signal)
    }
}

impl FromStr for Pin {
    type Err = core::convert::Infallible;

    /// Decimal numbers become [`Pin::Numbered`], anything else a signal name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u8>() {
            Ok(n) => Pin::Numbered(n),
            Err(_) => Pin::Named(s.to_string()),
        })
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Numbered(n) => write!(f, "{}", n),
            Pin::Named(s) => f.write_str(s),
        }
    }
}

/// A programming connector on the programmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInterface {
    name: String,
    pin_count: Option<u8>,
    custom_mapping: Option<Vec<u8>>,
    signal_pins: BTreeMap<String, u8>,
}

impl SocketInterface {
    /// Create a socket interface
    ///
    /// * `pin_count` - pins on the socket; `None` means the interface cannot
    ///   transpose package pins and only serves hardwired signals
    /// * `custom_mapping` - internal pin for each socket pin, socket pin 1 first;
    ///   must have exactly `pin_count` entries
    /// * `signal_pins` - signals hardwired to fixed internal pins
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        pin_count: Option<u8>,
        custom_mapping: Option<Vec<u8>>,
        signal_pins: impl IntoIterator<Item = (S, u8)>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if let Some(mapping) = &custom_mapping {
            let expected = pin_count.unwrap_or(0);
            if mapping.len() != usize::from(expected) {
                return Err(ConfigError::MappingLength {
                    interface: name,
                    mapped: mapping.len(),
                    pin_count: expected,
                });
            }
        }
        Ok(Self {
            name,
            pin_count,
            custom_mapping,
            signal_pins: signal_pins
                .into_iter()
                .map(|(s, p)| (s.into(), p))
                .collect(),
        })
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pins on the socket, if it has a geometry
    pub fn pin_count(&self) -> Option<u8> {
        self.pin_count
    }

    /// Custom socket-to-internal mapping, if any
    pub fn custom_mapping(&self) -> Option<&[u8]> {
        self.custom_mapping.as_deref()
    }

    /// Hardwired signals
    pub fn signal_pins(&self) -> &BTreeMap<String, u8> {
        &self.signal_pins
    }

    /// Internal pin number wired to a socket pin
    pub fn internal_pin(&self, socket_pin: u8) -> Result<u8, ConfigError> {
        match &self.custom_mapping {
            None => Ok(socket_pin),
            Some(mapping) => usize::from(socket_pin)
                .checked_sub(1)
                .and_then(|idx| mapping.get(idx))
                .copied()
                .ok_or_else(|| ConfigError::SocketPinOutOfRange {
                    interface: self.name.clone(),
                    pin: socket_pin,
                }),
        }
    }

    /// Internal pin under a device's package pin, for a left-justified chip
    pub fn socket_position(
        &self,
        device: &DeviceDescriptor,
        package_pin: u8,
    ) -> Result<u8, ConfigError> {
        let socket_pins = self.pin_count.ok_or_else(|| ConfigError::NoPinMapping {
            interface: self.name.clone(),
        })?;
        let chip_pins = device
            .pin_count()
            .ok_or_else(|| ConfigError::NoPackageLayout {
                device: device.name.clone(),
            })?;
        let does_not_fit = || ConfigError::PinDoesNotFit {
            device: device.name.clone(),
            interface: self.name.clone(),
            pin: package_pin,
        };
        if package_pin == 0 || package_pin > chip_pins {
            return Err(does_not_fit());
        }

        // Midpoint is (chip_pins + 1) / 2; there is no pin zero
        if 2 * u16::from(package_pin) < u16::from(chip_pins) + 1 {
            self.internal_pin(package_pin)
        } else {
            let socket_pin = socket_pins
                .checked_sub(chip_pins - package_pin)
                .filter(|&p| p > 0)
                .ok_or_else(does_not_fit)?;
            self.internal_pin(socket_pin)
        }
    }

    /// Internal pin carrying `signal`
    ///
    /// Hardwired signals win regardless of `device`. Otherwise the device's
    /// package pin for the signal is transposed onto this socket.
    pub fn signal_pin(
        &self,
        signal: &str,
        device: Option<&DeviceDescriptor>,
    ) -> Result<u8, ConfigError> {
        if let Some(pin) = self.signal_pins.get(signal) {
            return Ok(*pin);
        }

        let device = device.ok_or_else(|| ConfigError::SignalNeedsDevice {
            interface: self.name.clone(),
            signal: signal.to_string(),
        })?;
        if self.pin_count.is_none() {
            return Err(ConfigError::NoPinMapping {
                interface: self.name.clone(),
            });
        }

        let package_pin = device
            .package_pin(signal)
            .ok_or_else(|| ConfigError::UnknownSignal {
                device: device.name.clone(),
                signal: signal.to_string(),
            })?;
        self.socket_position(device, package_pin)
    }

    /// Resolve several signals at once
    pub fn signal_pin_map(
        &self,
        device: &DeviceDescriptor,
        signals: &[&str],
    ) -> Result<SignalMap, ConfigError> {
        signals
            .iter()
            .map(|&signal| Ok((signal.to_string(), self.signal_pin(signal, Some(device))?)))
            .collect()
    }

    /// Resolve the programming signals (`vcc`, `gnd`, `mosi`, `miso`, `sck`, `reset`)
    pub fn programming_pins(&self, device: &DeviceDescriptor) -> Result<SignalMap, ConfigError> {
        self.signal_pin_map(device, &DEFAULT_SIGNALS)
    }
}

impl fmt::Display for SocketInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::PackageLayout;

    fn eight_pin() -> DeviceDescriptor {
        DeviceDescriptor::new("attiny_8pin").with_layout(PackageLayout {
            pin_count: Some(8),
            gnd: Some(4),
            vcc: Some(8),
            sck: Some(7),
            miso: Some(6),
            mosi: Some(5),
            reset: Some(1),
            io_pins: [("PB3", 2), ("PB4", 3), ("PB0", 5)]
                .into_iter()
                .map(|(s, p)| (s.to_string(), p))
                .collect(),
        })
    }

    fn zif() -> SocketInterface {
        SocketInterface::new("ZIF SOCKET", Some(20), None, [(DOPPEL_SCL, 19), (DOPPEL_SDA, 18)])
            .unwrap()
    }

    fn no_signals() -> [(&'static str, u8); 0] {
        []
    }

    fn isp_cable() -> SocketInterface {
        SocketInterface::new(
            "EXTERNAL ISP CABLE",
            None,
            None,
            [("gnd", 1), ("vcc", 20), ("sck", 23), ("miso", 22), ("mosi", 21), ("reset", 28)],
        )
        .unwrap()
    }

    #[test]
    fn test_transposition_endpoints() {
        let socket = zif();
        let chip = eight_pin();
        assert_eq!(socket.socket_position(&chip, 1).unwrap(), 1);
        assert_eq!(socket.socket_position(&chip, 8).unwrap(), 20);
    }

    #[test]
    fn test_transposition_right_side_mirrors_far_end() {
        let socket = zif();
        for pin_count in [8u8, 14, 20] {
            let chip = DeviceDescriptor::new("chip").with_layout(PackageLayout {
                pin_count: Some(pin_count),
                ..Default::default()
            });
            for p in 1..=pin_count {
                let expected = if 2 * u16::from(p) < u16::from(pin_count) + 1 {
                    p
                } else {
                    20 - (pin_count - p)
                };
                assert_eq!(socket.socket_position(&chip, p).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_left_side_includes_last_pin_before_midpoint() {
        // 8-pin midpoint is 4.5, so pin 4 stays on the left
        assert_eq!(zif().socket_position(&eight_pin(), 4).unwrap(), 4);
        assert_eq!(zif().socket_position(&eight_pin(), 5).unwrap(), 17);
    }

    #[test]
    fn test_programming_pins_on_zif() {
        let pins = zif().programming_pins(&eight_pin()).unwrap();
        assert_eq!(pins["reset"], 1);
        assert_eq!(pins["gnd"], 4);
        assert_eq!(pins["mosi"], 17);
        assert_eq!(pins["miso"], 18);
        assert_eq!(pins["sck"], 19);
        assert_eq!(pins["vcc"], 20);
    }

    #[test]
    fn test_hardwired_signal_wins_over_device() {
        let socket = isp_cable();
        let bare = DeviceDescriptor::new("bare");
        assert_eq!(socket.signal_pin("sck", Some(&bare)).unwrap(), 23);
        assert_eq!(socket.signal_pin("sck", Some(&eight_pin())).unwrap(), 23);
        assert_eq!(socket.signal_pin("reset", None).unwrap(), 28);
    }

    #[test]
    fn test_io_pin_resolution() {
        assert_eq!(zif().signal_pin("PB3", Some(&eight_pin())).unwrap(), 2);
        assert_eq!(zif().signal_pin("PB0", Some(&eight_pin())).unwrap(), 17);
    }

    #[test]
    fn test_unknown_signal_is_config_error() {
        let err = zif().signal_pin("PA7", Some(&eight_pin())).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownSignal {
                device: "attiny_8pin".into(),
                signal: "PA7".into()
            }
        );
        assert!(matches!(
            zif().signal_pin("PB3", None),
            Err(ConfigError::SignalNeedsDevice { .. })
        ));
        assert!(matches!(
            isp_cable().signal_pin("PB3", Some(&eight_pin())),
            Err(ConfigError::NoPinMapping { .. })
        ));
    }

    #[test]
    fn test_custom_mapping() {
        let mapping: Vec<u8> = (1..=8).rev().collect();
        let socket = SocketInterface::new("reversed", Some(8), Some(mapping), no_signals()).unwrap();
        assert_eq!(socket.internal_pin(1).unwrap(), 8);
        assert_eq!(socket.internal_pin(8).unwrap(), 1);
        assert!(matches!(
            socket.internal_pin(9),
            Err(ConfigError::SocketPinOutOfRange { pin: 9, .. })
        ));
        assert!(socket.internal_pin(0).is_err());
    }

    #[test]
    fn test_incomplete_mapping_fails_fast() {
        let err = SocketInterface::new("short", Some(8), Some(vec![1, 2, 3]), no_signals())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MappingLength {
                interface: "short".into(),
                mapped: 3,
                pin_count: 8
            }
        );
    }

    #[test]
    fn test_chip_larger_than_socket() {
        let socket = SocketInterface::new("tiny", Some(8), None, no_signals()).unwrap();
        let chip = DeviceDescriptor::new("big").with_layout(PackageLayout {
            pin_count: Some(20),
            ..Default::default()
        });
        assert!(matches!(
            socket.socket_position(&chip, 15),
            Err(ConfigError::PinDoesNotFit { pin: 15, .. })
        ));
    }

    #[test]
    fn test_pin_from_str() {
        assert_eq!("19".parse::<Pin>().unwrap(), Pin::Numbered(19));
        assert_eq!("PB0".parse::<Pin>().unwrap(), Pin::Named("PB0".into()));
    }
}
