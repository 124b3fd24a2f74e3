//! upp - AVR programmer for the UPP node
//!
//! Identifies the chip sitting in one of the node's socket interfaces,
//! programs and verifies Intel HEX images, manages fuses and EEPROM, and
//! relays messages over the doppel bus.

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands, EepromCommands, FuseCommands};
use commands::program::ProgramOptions;
use programmers::open_session;
use std::path::Path;
use upp_core::chip::Catalog;
use upp_core::flash::FuseUpdate;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG still wins over -v
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(cli.verbose)),
    )
    .init();

    let catalog = match load_catalog(cli.catalog.as_deref()) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Failed to load device catalog: {}", e);
            std::process::exit(1);
        }
    };

    log::debug!(
        "Catalog: {} chips, {} layouts, {} interfaces",
        catalog.registry.len(),
        catalog.prototypes.len(),
        catalog.interfaces.len()
    );

    match cli.command {
        Commands::Program {
            programmer,
            input,
            lfuse,
            no_eeprom_seed,
            no_run,
        } => {
            let mut session = open_session(&programmer, catalog)?;
            commands::program::run_program(
                &mut session,
                &ProgramOptions {
                    input: &input,
                    lfuse,
                    seed_eeprom: !no_eeprom_seed,
                    run: !no_run,
                },
            )
        }
        Commands::Identify { programmer } => {
            let mut session = open_session(&programmer, catalog)?;
            commands::chip::identify(&mut session)
        }
        Commands::Fuses {
            programmer,
            command,
        } => {
            let mut session = open_session(&programmer, catalog)?;
            match command {
                FuseCommands::Read => commands::chip::cmd_fuses_read(&mut session),
                FuseCommands::Set {
                    lfuse,
                    hfuse,
                    efuse,
                } => commands::chip::cmd_fuses_set(
                    &mut session,
                    FuseUpdate {
                        lfuse,
                        hfuse,
                        efuse,
                    },
                ),
            }
        }
        Commands::Eeprom {
            programmer,
            command,
        } => {
            let mut session = open_session(&programmer, catalog)?;
            match command {
                EepromCommands::Read { address } => {
                    commands::chip::cmd_eeprom_read(&mut session, address)
                }
                EepromCommands::Write { address, value } => {
                    commands::chip::cmd_eeprom_write(&mut session, address, value)
                }
            }
        }
        Commands::Run { programmer } => {
            let mut session = open_session(&programmer, catalog)?;
            commands::chip::cmd_run(&mut session)
        }
        Commands::ReadPin {
            programmer,
            interface,
            internal,
            pin,
        } => {
            let mut session = open_session(&programmer, catalog)?;
            commands::chip::cmd_read_pin(&mut session, interface.as_deref(), &pin, internal)
        }
        Commands::Doppel {
            programmer,
            interface,
            command,
        } => {
            let mut session = open_session(&programmer, catalog)?;
            commands::doppel::run_doppel(&mut session, interface.as_deref(), &command)
        }
        Commands::ListChips => {
            commands::list_chips(&catalog);
            Ok(())
        }
        Commands::ListInterfaces => {
            commands::list_interfaces(&catalog);
            Ok(())
        }
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
    }
}

/// Log filter used when RUST_LOG is not set
fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Load the built-in catalog, or the one at `path` instead
fn load_catalog(path: Option<&Path>) -> Result<Catalog, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(Catalog::builtin()?);
    };

    let mut catalog = Catalog::new();
    let count = if path.is_dir() {
        catalog.load_dir(path)?
    } else if path.is_file() {
        catalog.load_file(path)?
    } else {
        return Err(format!("Catalog path not found: {}", path.display()).into());
    };
    log::info!("Loaded {} chip definitions from {}", count, path.display());
    Ok(catalog)
}
