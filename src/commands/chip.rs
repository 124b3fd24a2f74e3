//! Chip commands: identify, fuses, EEPROM, run and pin reads

use upp_core::flash::{FuseUpdate, Fuses};
use upp_core::socket::Pin;

use crate::programmers::UppSession;

/// Format fuse bytes for display
pub fn format_fuses(fuses: &Fuses) -> String {
    format!(
        "lfuse=0x{:02X} hfuse=0x{:02X} efuse=0x{:02X}",
        fuses.lfuse, fuses.hfuse, fuses.efuse
    )
}

/// Identify the installed chip and print what was found
pub fn identify(session: &mut UppSession) -> Result<(), Box<dyn std::error::Error>> {
    let device = session.identify()?;
    let (name, signature, page_size) = (device.name.clone(), device.signature, device.page_size);

    println!("Found: {} in {}", name, session.active_interface().name());
    if let Some(signature) = signature {
        println!("  Signature: 0x{:06X}", signature);
    }
    match page_size {
        Some(size) => println!("  Page size: {} bytes", size),
        None => println!("  Page size: unknown (programming not supported)"),
    }
    Ok(())
}

/// Print the fuse bytes
pub fn cmd_fuses_read(session: &mut UppSession) -> Result<(), Box<dyn std::error::Error>> {
    identify(session)?;
    let fuses = session.read_fuses()?;
    println!("Fuses: {}", format_fuses(&fuses));
    Ok(())
}

/// Change some fuse bytes
pub fn cmd_fuses_set(
    session: &mut UppSession,
    update: FuseUpdate,
) -> Result<(), Box<dyn std::error::Error>> {
    if update.is_empty() {
        return Err("Nothing to set (use --lfuse, --hfuse or --efuse)".into());
    }
    identify(session)?;
    let fuses = session.set_fuses(update)?;
    println!("Fuses: {}", format_fuses(&fuses));
    Ok(())
}

/// Print one EEPROM byte
pub fn cmd_eeprom_read(
    session: &mut UppSession,
    address: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    identify(session)?;
    let value = session.read_eeprom(address)?;
    println!("EEPROM[0x{:02X}] = 0x{:02X}", address, value);
    Ok(())
}

/// Write and verify one EEPROM byte
pub fn cmd_eeprom_write(
    session: &mut UppSession,
    address: u8,
    value: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    identify(session)?;
    session.write_eeprom(address, value)?;
    println!("EEPROM[0x{:02X}] = 0x{:02X} (verified)", address, value);
    Ok(())
}

/// Release the chip
pub fn cmd_run(session: &mut UppSession) -> Result<(), Box<dyn std::error::Error>> {
    session.run_chip()?;
    println!("Chip is running");
    Ok(())
}

/// Print the level of a chip pin or internal pin
pub fn cmd_read_pin(
    session: &mut UppSession,
    interface: Option<&str>,
    pin: &Pin,
    internal: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(name) = interface {
        session.select_interface(name)?;
    }
    let level = match (internal, pin) {
        (true, Pin::Numbered(n)) => session.read_internal_pin(*n)?,
        (true, Pin::Named(_)) => return Err("--internal needs a pin number".into()),
        (false, pin) => session.read_chip_pin(pin)?,
    };
    println!("{}: {}", pin, level);
    Ok(())
}
