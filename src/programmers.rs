//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all programmers, with support
//! for feature-gated inclusion and dynamic help text generation.

use upp_core::chip::Catalog;
use upp_core::programmer::Transaction;
use upp_core::Session;

/// A session over whichever programmer was selected
pub type UppSession = Session<Box<dyn Transaction>>;

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &["sim"],
        description: "Simulated node with a chip installed (chip=<name>,interface=<name>)",
    });

    #[cfg(feature = "gestalt")]
    programmers.push(ProgrammerInfo {
        name: "gestalt",
        aliases: &["upp"],
        description: "Gestalt node over serial/network (dev=<port>[,baud=<rate>] or ip=<host:port>)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:12} - {}\n", p.name, p.description));
    }
    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Resolve a programmer name or alias to its primary name
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map(|p| p.name)
}

/// Parse a programmer string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// Open the programmer named by `programmer`
///
/// The catalog is needed by the simulator to pick the chip it carries.
#[allow(unused_variables)]
pub fn open_programmer(
    programmer: &str,
    catalog: &Catalog,
) -> Result<Box<dyn Transaction>, Box<dyn std::error::Error>> {
    let (name, options) = parse_programmer_string(programmer);

    let canonical_name = match find_programmer(name) {
        Some(n) => n,
        None => return Err(unknown_programmer_error(name)),
    };

    match canonical_name {
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&options, catalog),

        #[cfg(feature = "gestalt")]
        "gestalt" => {
            let options = upp_gestalt::GestaltOptions::from_params(&options)
                .map_err(|e| format!("Invalid gestalt parameters: {}", e))?;
            log::info!("Opening Gestalt node {}...", options.address);
            upp_gestalt::open_gestalt(&options).map_err(|e| {
                format!(
                    "Failed to open Gestalt node: {}\n\
                     Make sure the node is connected and you have permissions.",
                    e
                )
                .into()
            })
        }

        _ => Err(unknown_programmer_error(name)),
    }
}

/// Open a session over `programmer` with `catalog`
pub fn open_session(
    programmer: &str,
    catalog: Catalog,
) -> Result<UppSession, Box<dyn std::error::Error>> {
    let link = open_programmer(programmer, &catalog)?;
    Ok(Session::new(link, catalog)?)
}

#[cfg(feature = "dummy")]
fn open_dummy(
    options: &[(&str, &str)],
    catalog: &Catalog,
) -> Result<Box<dyn Transaction>, Box<dyn std::error::Error>> {
    use upp_sim::{SimConfig, SimulatedUpp};

    let get = |key: &str| options.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);

    let chip = get("chip").unwrap_or("ATTiny85");
    let device = catalog
        .registry
        .find_by_name(chip)
        .ok_or_else(|| format!("Unknown chip: {}", chip))?;

    let interface = match get("interface") {
        Some(name) => catalog
            .find_interface(name)
            .ok_or_else(|| format!("Unknown interface: {}", name))?,
        None => catalog
            .interfaces
            .iter()
            .find(|i| i.programming_pins(device).is_ok())
            .ok_or_else(|| format!("{} fits no socket interface", device.name))?,
    };

    log::info!("Simulating {} in {}", device.name, interface.name());
    Ok(Box::new(SimulatedUpp::new(SimConfig::new(
        device.clone(),
        interface.clone(),
    ))))
}

fn unknown_programmer_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown programmer: {}\n\n", name);
    msg.push_str(&programmer_help());
    msg.push_str("\nUse 'upp list-programmers' for more details");
    msg.into()
}
