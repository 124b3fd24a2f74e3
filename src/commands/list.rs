//! List commands implementation

use upp_core::chip::Catalog;

use crate::programmers;

/// List all supported programmers
pub fn list_programmers() {
    println!("{}", programmers::programmer_help());
}

/// List all known chips
pub fn list_chips(catalog: &Catalog) {
    println!("Known chips:");
    println!();
    println!("{:<16} {:>10} {:>10} {:>6}", "Name", "Signature", "Page size", "Pins");
    println!("{}", "-".repeat(46));

    for device in catalog.registry.iter() {
        let signature = device
            .signature
            .map_or_else(|| "-".to_string(), |s| format!("0x{:06X}", s));
        let page_size = device
            .page_size
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        let pins = device
            .pin_count()
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        println!("{:<16} {:>10} {:>10} {:>6}", device.name, signature, page_size, pins);
    }

    if !catalog.prototypes.is_empty() {
        println!();
        println!("Discovery layouts (in search order):");
        for prototype in &catalog.prototypes {
            println!("  {}", prototype.name);
        }
    }
}

/// List socket interfaces in discovery order
pub fn list_interfaces(catalog: &Catalog) {
    println!("Socket interfaces (in search order):");
    for interface in &catalog.interfaces {
        println!();
        match interface.pin_count() {
            Some(n) => println!("  {} ({} pins)", interface.name(), n),
            None => println!("  {} (hardwired)", interface.name()),
        }
        if interface.custom_mapping().is_some() {
            println!("    custom pin mapping");
        }
        for (signal, pin) in interface.signal_pins() {
            println!("    {:<10} -> pin {}", signal, pin);
        }
    }
}
