//! Doppel command implementations

use crate::cli::DoppelCommands;
use crate::programmers::UppSession;

/// Parse whitespace-separated hex bytes
fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    s.split_whitespace()
        .map(|b| {
            let b = b.trim_start_matches("0x");
            u8::from_str_radix(b, 16).map_err(|e| format!("Invalid hex byte '{}': {}", b, e))
        })
        .collect()
}

fn format_message(message: &[u8]) -> String {
    let hex: Vec<String> = message.iter().map(|b| format!("{:02X}", b)).collect();
    let text: String = message
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect();
    format!("{}  |{}|", hex.join(" "), text)
}

/// Run a doppel subcommand
pub fn run_doppel(
    session: &mut UppSession,
    interface: Option<&str>,
    command: &DoppelCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(name) = interface {
        session.select_interface(name)?;
    }
    let interface = session.active_interface().name().to_string();
    let mut relay = session.doppel();

    match command {
        DoppelCommands::Configure { scl, sda } => {
            let (scl, sda) = relay.configure(scl.as_ref(), sda.as_ref())?;
            println!("Doppel bus on {}: scl={} sda={}", interface, scl, sda);
        }
        DoppelCommands::Enable => {
            relay.enable_receiver()?;
            println!("Doppel receiver enabled");
        }
        DoppelCommands::Send {
            address,
            hex,
            message,
        } => {
            let payload = if *hex {
                parse_hex_bytes(message)?
            } else {
                message.as_bytes().to_vec()
            };
            relay.send_message(*address, &payload)?;
            println!("Sent {} bytes to 0x{:02X}", payload.len(), address);
        }
        DoppelCommands::Read => {
            let messages = relay.read_messages()?;
            if messages.is_empty() {
                println!("No messages");
            }
            for (i, message) in messages.iter().enumerate() {
                println!("{:3}: {}", i, format_message(message));
            }
        }
        DoppelCommands::Reset => {
            relay.reset_message_buffer()?;
            println!("Doppel buffer cleared");
        }
        DoppelCommands::FreeRun => {
            relay.enter_free_running_mode()?;
            println!("Node is free-running");
        }
    }
    Ok(())
}
