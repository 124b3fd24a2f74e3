//! CLI argument parsing

use crate::programmers;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use upp_core::socket::Pin;

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a pin as a number or a signal name
fn parse_pin(s: &str) -> Result<Pin, String> {
    if s.is_empty() {
        return Err("Empty pin name".to_string());
    }
    s.parse::<Pin>().map_err(|e| e.to_string())
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "upp")]
#[command(author, version, about = "AVR programmer for the UPP node", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Device catalog file or directory of .ron files
    /// Replaces the built-in catalog
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify, program and verify a chip, then set fuses and run it
    Program {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Intel HEX image to program
        #[arg(short, long)]
        input: PathBuf,

        /// Low fuse value to set after programming
        #[arg(long, value_parser = parse_hex_u8, default_value = "0xE2")]
        lfuse: u8,

        /// Don't write the random EEPROM seed
        #[arg(long)]
        no_eeprom_seed: bool,

        /// Leave the chip in programming mode
        #[arg(long)]
        no_run: bool,
    },

    /// Identify the installed chip
    Identify {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,
    },

    /// Fuse operations
    Fuses {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        #[command(subcommand)]
        command: FuseCommands,
    },

    /// EEPROM operations
    Eeprom {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        #[command(subcommand)]
        command: EepromCommands,
    },

    /// Release the chip to run its program
    Run {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,
    },

    /// Read the level of a chip pin
    ReadPin {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Socket interface the chip is in (defaults to the first)
        #[arg(long)]
        interface: Option<String>,

        /// Treat the pin as an internal programmer pin number
        #[arg(long)]
        internal: bool,

        /// Package pin number or signal name (e.g. 5, PB0, doppelscl)
        #[arg(value_parser = parse_pin)]
        pin: Pin,
    },

    /// Doppel bus operations
    Doppel {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Socket interface the chip is in (defaults to the first)
        #[arg(long)]
        interface: Option<String>,

        #[command(subcommand)]
        command: DoppelCommands,
    },

    /// List known chips
    ListChips,

    /// List socket interfaces
    ListInterfaces,

    /// List supported programmers
    ListProgrammers,
}

/// Fuse subcommands
#[derive(Subcommand)]
pub enum FuseCommands {
    /// Read all fuse bytes
    Read,

    /// Change some fuse bytes, keeping the rest
    Set {
        /// Low fuse
        #[arg(long, value_parser = parse_hex_u8)]
        lfuse: Option<u8>,

        /// High fuse
        #[arg(long, value_parser = parse_hex_u8)]
        hfuse: Option<u8>,

        /// Extended fuse
        #[arg(long, value_parser = parse_hex_u8)]
        efuse: Option<u8>,
    },
}

/// EEPROM subcommands
#[derive(Subcommand)]
pub enum EepromCommands {
    /// Read one byte
    Read {
        /// Address (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        address: u8,
    },

    /// Write one byte and verify it
    Write {
        /// Address (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        address: u8,

        /// Value (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        value: u8,
    },
}

/// Doppel subcommands
#[derive(Subcommand)]
pub enum DoppelCommands {
    /// Assign the bus to two pins
    Configure {
        /// Clock pin: internal pin number or signal name
        #[arg(long, value_parser = parse_pin)]
        scl: Option<Pin>,

        /// Data pin: internal pin number or signal name
        #[arg(long, value_parser = parse_pin)]
        sda: Option<Pin>,
    },

    /// Start buffering incoming messages
    Enable,

    /// Send one message
    Send {
        /// Destination address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u8)]
        address: u8,

        /// Interpret the message as hex bytes (e.g. "01 ff 20")
        #[arg(long)]
        hex: bool,

        /// Message text
        message: String,
    },

    /// Fetch and print buffered messages
    Read,

    /// Clear the message buffer
    Reset,

    /// Leave the doppel session
    FreeRun,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u8() {
        assert_eq!(parse_hex_u8("0xE2"), Ok(0xE2));
        assert_eq!(parse_hex_u8("200"), Ok(200));
        assert!(parse_hex_u8("0x100").is_err());
    }

    #[test]
    fn test_parse_pin() {
        assert_eq!(parse_pin("5"), Ok(Pin::Numbered(5)));
        assert_eq!(parse_pin("PB0"), Ok(Pin::Named("PB0".into())));
        assert!(parse_pin("").is_err());
    }

    #[test]
    fn test_program_defaults() {
        let cli = Cli::parse_from(["upp", "program", "-p", "dummy", "-i", "blink.hex"]);
        match cli.command {
            Commands::Program {
                lfuse,
                no_eeprom_seed,
                no_run,
                ..
            } => {
                assert_eq!(lfuse, 0xE2);
                assert!(!no_eeprom_seed);
                assert!(!no_run);
            }
            _ => panic!("expected program"),
        }
    }
}
