//! upp-gestalt - Gestalt node transport for the UPP programmer
//!
//! This crate carries upp-core requests to a programmer node over a serial
//! port or a TCP bridge.
//!
//! # Protocol Overview
//!
//! Each request is one frame addressed to a port on the node; the node
//! answers with one frame from the same port. Frames carry a CRC-8 and are
//! resent until a valid reply arrives or the retry budget runs out. See
//! [`protocol`] for the layout.
//!
//! # Supported Transports
//!
//! - Serial port: `/dev/ttyUSB0`, `COM3`, etc.
//! - TCP socket: `host:port`
//!
//! # Example
//!
//! ```no_run
//! use upp_core::chip::Catalog;
//! use upp_core::Session;
//! use upp_gestalt::{GestaltNode, SerialTransport};
//!
//! let transport = SerialTransport::open("/dev/ttyUSB0", None)?;
//! let node = GestaltNode::new(transport);
//! let mut session = Session::new(node, Catalog::builtin()?)?;
//! let device = session.identify()?;
//! println!("found {}", device.name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-exports
pub use device::GestaltNode;
pub use error::{GestaltError, Result};
pub use transport::serial::SerialTransport;
pub use transport::tcp::TcpTransport;
pub use transport::Transport;

use upp_core::programmer::Transaction;

/// Connection options for a Gestalt node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestaltConnection {
    /// Serial port connection
    Serial {
        /// Device path (e.g., "/dev/ttyUSB0" or "COM3")
        device: String,
        /// Baud rate (None for the default)
        baud: Option<u32>,
    },
    /// TCP socket connection
    Tcp {
        /// Hostname or IP address
        host: String,
        /// Port number
        port: u16,
    },
}

/// Options for opening a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestaltOptions {
    /// How to reach the node
    pub connection: GestaltConnection,
    /// Node address
    pub address: u16,
    /// Attempts per transaction
    pub retries: u32,
    /// Reply timeout per attempt in milliseconds
    pub timeout_ms: u32,
}

impl GestaltOptions {
    /// Parse programmer parameters
    ///
    /// Accepts `dev=<port>` with optional `baud=<rate>`, or `ip=<host:port>`,
    /// plus optional `address=`, `retries=` and `timeout=` (milliseconds).
    pub fn from_params(params: &[(&str, &str)]) -> std::result::Result<Self, String> {
        let get = |key: &str| params.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
        fn number<N: std::str::FromStr>(key: &str, value: &str) -> std::result::Result<N, String> {
            value
                .parse()
                .map_err(|_| format!("Invalid {}: {}", key, value))
        }

        let connection = match (get("dev"), get("ip")) {
            (Some(device), None) => GestaltConnection::Serial {
                device: device.to_string(),
                baud: get("baud").map(|b| number("baud rate", b)).transpose()?,
            },
            (None, Some(ip)) => {
                let (host, port) = ip
                    .rsplit_once(':')
                    .ok_or_else(|| "Missing port in ip= parameter".to_string())?;
                GestaltConnection::Tcp {
                    host: host.to_string(),
                    port: number("port", port)?,
                }
            }
            (Some(_), Some(_)) => return Err("Use either dev= or ip=, not both".to_string()),
            (None, None) => {
                return Err("gestalt requires connection parameters.\n\
                    Usage: gestalt:dev=/dev/ttyUSB0[,baud=115200] or gestalt:ip=host:port\n\
                    Optional: address=<n>, retries=<n>, timeout=<ms>"
                    .to_string())
            }
        };

        Ok(Self {
            connection,
            address: get("address")
                .map(|v| number("address", v))
                .transpose()?
                .unwrap_or(protocol::DEFAULT_ADDRESS),
            retries: get("retries")
                .map(|v| number("retry count", v))
                .transpose()?
                .unwrap_or(device::DEFAULT_RETRIES),
            timeout_ms: get("timeout")
                .map(|v| number("timeout", v))
                .transpose()?
                .unwrap_or(device::DEFAULT_TIMEOUT_MS),
        })
    }
}

fn configure<T: Transport>(node: GestaltNode<T>, options: &GestaltOptions) -> GestaltNode<T> {
    node.with_address(options.address)
        .with_retries(options.retries)
        .with_timeout(options.timeout_ms)
}

/// Open a node and return it as a boxed transaction primitive
pub fn open_gestalt(
    options: &GestaltOptions,
) -> std::result::Result<Box<dyn Transaction>, Box<dyn std::error::Error>> {
    match &options.connection {
        GestaltConnection::Serial { device, baud } => {
            let transport = SerialTransport::open(device, *baud)?;
            Ok(Box::new(configure(GestaltNode::new(transport), options)))
        }
        GestaltConnection::Tcp { host, port } => {
            let transport = TcpTransport::connect(host, *port)?;
            Ok(Box::new(configure(GestaltNode::new(transport), options)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serial() {
        let options = GestaltOptions::from_params(&[("dev", "/dev/ttyUSB0"), ("baud", "57600")])
            .unwrap();
        assert_eq!(
            options.connection,
            GestaltConnection::Serial {
                device: "/dev/ttyUSB0".into(),
                baud: Some(57600)
            }
        );
        assert_eq!(options.address, protocol::DEFAULT_ADDRESS);
        assert_eq!(options.retries, device::DEFAULT_RETRIES);
    }

    #[test]
    fn test_parse_tcp_with_options() {
        let options = GestaltOptions::from_params(&[
            ("ip", "localhost:7777"),
            ("address", "3"),
            ("retries", "10"),
        ])
        .unwrap();
        assert_eq!(
            options.connection,
            GestaltConnection::Tcp {
                host: "localhost".into(),
                port: 7777
            }
        );
        assert_eq!(options.address, 3);
        assert_eq!(options.retries, 10);
    }

    #[test]
    fn test_parse_errors() {
        assert!(GestaltOptions::from_params(&[]).is_err());
        assert!(GestaltOptions::from_params(&[("ip", "localhost")]).is_err());
        assert!(GestaltOptions::from_params(&[("dev", "x"), ("ip", "y:1")]).is_err());
        assert!(GestaltOptions::from_params(&[("dev", "x"), ("retries", "many")]).is_err());
    }
}
