//! Program command implementation

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use upp_core::flash::{FlashImage, FuseUpdate, ProgramProgress};

use super::chip::{format_fuses, identify};
use crate::programmers::UppSession;

/// Number of EEPROM bytes seeded after programming
const EEPROM_SEED_LEN: u8 = 4;

/// Progress reporter using indicatif progress bars
struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    fn new() -> Self {
        Self { current_bar: None }
    }

    fn create_bar(&mut self, pages: usize, phase: &str) {
        let pb = ProgressBar::new(pages as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} pages {}",
                    phase
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.current_bar = Some(pb);
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl ProgramProgress for IndicatifProgress {
    fn erasing(&mut self) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Erasing chip...");
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn writing(&mut self, pages: usize) {
        self.finish("Erase complete");
        self.create_bar(pages, "Writing");
    }

    fn page_written(&mut self, _address: u16) {
        if let Some(pb) = &self.current_bar {
            pb.inc(1);
        }
    }

    fn verifying(&mut self, pages: usize) {
        self.finish("Write complete");
        self.create_bar(pages, "Verifying");
    }

    fn page_verified(&mut self, _address: u16) {
        if let Some(pb) = &self.current_bar {
            pb.inc(1);
        }
    }

    fn complete(&mut self) {
        self.finish("Verification passed");
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon_with_message("Failed");
        }
    }
}

/// Options of the program command
pub struct ProgramOptions<'a> {
    pub input: &'a Path,
    pub lfuse: u8,
    pub seed_eeprom: bool,
    pub run: bool,
}

/// Run the program command
///
/// Identify, program and verify the image, set the low fuse, seed the first
/// EEPROM bytes with random values and release the chip.
pub fn run_program(
    session: &mut UppSession,
    options: &ProgramOptions<'_>,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = FlashImage::load_hex_file(options.input)?;
    println!("Read {} bytes from {:?}", image.len(), options.input);

    identify(session)?;

    let mut progress = IndicatifProgress::new();
    let pages = session.program_image(&image, &mut progress)?;
    println!("Programmed {} pages", pages);

    let fuses = session.set_fuses(FuseUpdate::lfuse(options.lfuse))?;
    println!("Fuses: {}", format_fuses(&fuses));

    if options.seed_eeprom {
        let seed: [u8; EEPROM_SEED_LEN as usize] = rand::random();
        for (address, value) in (0..EEPROM_SEED_LEN).zip(seed) {
            session.write_eeprom(address, value)?;
        }
        println!("EEPROM seed: {:02X?}", seed);
    }

    if options.run {
        session.run_chip()?;
        println!("Chip is running");
    }

    println!("Program complete!");
    Ok(())
}
