//! Programming workflow
//!
//! Whole-image programming plus the fuse, EEPROM and run steps around it.
//! Every step needs a session in which the chip has been identified.

use super::fuses::{FuseUpdate, Fuses};
use super::image::{FlashImage, FlashPage};
use crate::error::{ConfigError, Error, Result};
use crate::programmer::Transaction;
use crate::protocol;
use crate::session::Session;

/// Callback for progress reporting during programming
pub trait ProgramProgress {
    /// Called before the chip is erased
    fn erasing(&mut self);

    /// Called when starting to write `pages` pages
    fn writing(&mut self, pages: usize);

    /// Called after each page is committed
    fn page_written(&mut self, address: u16);

    /// Called when starting to verify `pages` pages
    fn verifying(&mut self, pages: usize);

    /// Called after each page is verified
    fn page_verified(&mut self, address: u16);

    /// Called when the whole image is programmed and verified
    fn complete(&mut self);
}

/// A no-op progress reporter
pub struct NoProgress;

impl ProgramProgress for NoProgress {
    fn erasing(&mut self) {}
    fn writing(&mut self, _pages: usize) {}
    fn page_written(&mut self, _address: u16) {}
    fn verifying(&mut self, _pages: usize) {}
    fn page_verified(&mut self, _address: u16) {}
    fn complete(&mut self) {}
}

fn in_page<R>(address: u16, result: Result<R>) -> Result<R> {
    result.map_err(|e| Error::Page {
        address,
        source: Box::new(e),
    })
}

/// Compare a page with what was read back from it
fn compare_page(page: &FlashPage, read: &[u8]) -> Result<()> {
    if read.len() < page.data.len() {
        return Err(Error::ShortRead {
            address: page.address,
            expected: page.data.len(),
            actual: read.len(),
        });
    }
    match page.data.iter().zip(read).position(|(a, b)| a != b) {
        None => Ok(()),
        Some(offset) => Err(Error::PageVerify {
            address: page.address,
            offset,
            expected: page.data[offset],
            actual: read[offset],
        }),
    }
}

impl<T: Transaction> Session<T> {
    /// Flash page size of the identified device
    pub fn page_size(&self) -> Result<u16> {
        let device = self.device()?;
        device.page_size.ok_or_else(|| {
            ConfigError::NoPageSize {
                device: device.name.clone(),
            }
            .into()
        })
    }

    /// Split an image into pages of the identified device
    pub fn paginate(&self, image: &FlashImage) -> Result<Vec<FlashPage>> {
        Ok(image.pages(self.page_size()?)?)
    }

    /// Erase the chip and program `pages`, then verify them
    ///
    /// Every page is written before any is verified. The first failing step
    /// aborts the run; pages already committed are left as they are.
    pub fn program<P: ProgramProgress + ?Sized>(
        &mut self,
        pages: &[FlashPage],
        progress: &mut P,
    ) -> Result<()> {
        let page_size = self.page_size()?;
        if let Some(page) = pages.iter().find(|p| p.data.len() > usize::from(page_size)) {
            return Err(ConfigError::TooLong {
                what: "page",
                len: page.data.len(),
            }
            .into());
        }

        protocol::init_programming_mode(&mut self.link)?;

        progress.erasing();
        protocol::erase_chip(&mut self.link)?;
        log::debug!("chip erased");

        progress.writing(pages.len());
        for page in pages {
            in_page(
                page.address,
                protocol::load_page_buffer(&mut self.link, page.address, &page.data),
            )?;
            in_page(page.address, protocol::commit_page(&mut self.link, page.address))?;
            log::debug!("wrote page 0x{:04X} ({} bytes)", page.address, page.data.len());
            progress.page_written(page.address);
        }

        progress.verifying(pages.len());
        self.verify_pages(pages, |address| progress.page_verified(address))?;

        progress.complete();
        log::info!("programmed and verified {} pages", pages.len());
        Ok(())
    }

    /// Page, program and verify an image
    pub fn program_image<P: ProgramProgress + ?Sized>(
        &mut self,
        image: &FlashImage,
        progress: &mut P,
    ) -> Result<usize> {
        let pages = self.paginate(image)?;
        self.program(&pages, progress)?;
        Ok(pages.len())
    }

    /// Read back each page and compare it with `pages`
    ///
    /// A full page is read; only the bytes the page holds are compared.
    pub fn verify_pages(
        &mut self,
        pages: &[FlashPage],
        mut on_verified: impl FnMut(u16),
    ) -> Result<()> {
        let page_size = usize::from(self.page_size()?);
        for page in pages {
            let read = in_page(
                page.address,
                protocol::read_back(&mut self.link, page.address, page_size),
            )?;
            compare_page(page, &read)?;
            log::debug!("verified page 0x{:04X}", page.address);
            on_verified(page.address);
        }
        Ok(())
    }

    /// Read the fuse bytes
    pub fn read_fuses(&mut self) -> Result<Fuses> {
        self.device()?;
        protocol::read_fuses(&mut self.link)
    }

    /// Write all three fuse bytes
    pub fn write_fuses(&mut self, fuses: &Fuses) -> Result<()> {
        self.device()?;
        protocol::write_fuses(&mut self.link, fuses)
    }

    /// Change some fuse bytes, keeping the rest
    ///
    /// The current fuses are read first and the full set is written back.
    /// Returns what was written.
    pub fn set_fuses(&mut self, update: FuseUpdate) -> Result<Fuses> {
        let current = self.read_fuses()?;
        let fuses = current.merge(update);
        log::debug!("fuses {:?} -> {:?}", current, fuses);
        self.write_fuses(&fuses)?;
        Ok(fuses)
    }

    /// Write one EEPROM byte and read it back
    ///
    /// A mismatch fails only this call.
    pub fn write_eeprom(&mut self, address: u8, value: u8) -> Result<()> {
        self.device()?;
        protocol::write_eeprom_byte(&mut self.link, address, value)?;
        let actual = protocol::read_eeprom_byte(&mut self.link, address)?;
        if actual != value {
            return Err(Error::EepromVerify {
                address,
                expected: value,
                actual,
            });
        }
        Ok(())
    }

    /// Read one EEPROM byte
    pub fn read_eeprom(&mut self, address: u8) -> Result<u8> {
        self.device()?;
        protocol::read_eeprom_byte(&mut self.link, address)
    }

    /// Release the chip to run its program
    pub fn run_chip(&mut self) -> Result<()> {
        protocol::run_chip(&mut self.link)?;
        log::debug!("chip released from reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{Catalog, DeviceDescriptor};
    use crate::protocol::{field, Operation, Packet, Request, Response};
    use crate::socket::SocketInterface;
    use std::collections::BTreeMap;

    /// Flash, fuse and EEPROM memory behind the protocol
    #[derive(Default)]
    struct Memory {
        flash: BTreeMap<u16, u8>,
        buffer: BTreeMap<u16, u8>,
        fuses: [u8; 3],
        eeprom: BTreeMap<u8, u8>,
        eeprom_readback: Option<u8>,
        stuck: Option<(u16, u8)>,
        silent: Option<Operation>,
        log: Vec<Operation>,
    }

    impl Transaction for Memory {
        fn transact(&mut self, request: &Request) -> Option<Response> {
            let op = request.operation;
            self.log.push(op);
            if self.silent == Some(op) {
                return None;
            }
            let uint = |name| request.packet.uint(name).unwrap_or(0);
            let reply = match op {
                Operation::ProgInit => Packet::new().with_uint(field::RESPONSE_CODE, 83),
                Operation::EraseChip => {
                    self.flash.clear();
                    Packet::new()
                }
                Operation::LoadData => {
                    let base = uint(field::BYTE_BASE_ADDRESS) as u16;
                    let data = request.packet.list(field::DATA).unwrap_or(&[]);
                    for (a, b) in (base..=u16::MAX).zip(data) {
                        self.buffer.insert(a, *b);
                    }
                    Packet::new()
                }
                Operation::WritePage => {
                    self.flash.append(&mut self.buffer);
                    if let Some((addr, value)) = self.stuck {
                        self.flash.insert(addr, value);
                    }
                    Packet::new()
                }
                Operation::ReadData => {
                    let base = uint(field::BYTE_BASE_ADDRESS) as u16;
                    let size = uint(field::DATA_SIZE) as usize;
                    let data: Vec<u8> = (base..=u16::MAX)
                        .take(size)
                        .map(|a| self.flash.get(&a).copied().unwrap_or(0xFF))
                        .collect();
                    Packet::new().with_list(field::DATA, data)
                }
                Operation::ReadFuses => Packet::new()
                    .with_uint(field::LFUSE, self.fuses[0].into())
                    .with_uint(field::HFUSE, self.fuses[1].into())
                    .with_uint(field::EFUSE, self.fuses[2].into()),
                Operation::WriteFuses => {
                    self.fuses = [
                        uint(field::LFUSE) as u8,
                        uint(field::HFUSE) as u8,
                        uint(field::EFUSE) as u8,
                    ];
                    Packet::new()
                }
                Operation::WriteEeprom => {
                    self.eeprom
                        .insert(uint(field::ADDRESS) as u8, uint(field::DATA) as u8);
                    Packet::new()
                }
                Operation::ReadEeprom => {
                    let stored = self.eeprom.get(&(uint(field::ADDRESS) as u8)).copied();
                    let value = self.eeprom_readback.or(stored).unwrap_or(0xFF);
                    Packet::new().with_uint(field::DATA, value.into())
                }
                _ => Packet::new(),
            };
            Some(Response::with_packet(op, reply))
        }
    }

    fn session(memory: Memory) -> Session<Memory> {
        let mut catalog = Catalog::new();
        catalog
            .interfaces
            .push(SocketInterface::new("ZIF SOCKET", Some(20), None, [("doppelscl", 19u8)]).unwrap());
        let mut session = Session::new(memory, catalog).unwrap();
        session.device = Some(
            DeviceDescriptor::new("ATTiny44")
                .with_signature(0x07921E)
                .with_page_size(64),
        );
        session
    }

    fn image() -> FlashImage {
        let mut image = FlashImage::new();
        image.add_data(0, &(0..100).collect::<Vec<u8>>());
        image
    }

    #[test]
    fn test_program_writes_all_then_verifies() {
        let mut session = session(Memory::default());
        assert_eq!(session.program_image(&image(), &mut NoProgress).unwrap(), 2);

        let log = &session.link().log;
        assert_eq!(
            log,
            &vec![
                Operation::ProgInit,
                Operation::EraseChip,
                Operation::LoadData,
                Operation::WritePage,
                Operation::LoadData,
                Operation::WritePage,
                Operation::ReadData,
                Operation::ReadData,
            ]
        );
        assert_eq!(session.link().flash.get(&99), Some(&99));
    }

    #[test]
    fn test_program_top_page() {
        let mut session = session(Memory::default());
        let mut image = FlashImage::new();
        image.add_data(0xFFC0, &(0..64).collect::<Vec<u8>>());

        assert_eq!(session.program_image(&image, &mut NoProgress).unwrap(), 1);
        assert_eq!(session.link().flash.get(&0xFFC0), Some(&0));
        assert_eq!(session.link().flash.get(&0xFFFF), Some(&63));
    }

    #[test]
    fn test_reprogramming_verifies_the_same() {
        let mut session = session(Memory::default());
        let pages = session.paginate(&image()).unwrap();

        session.program(&pages, &mut NoProgress).unwrap();
        session.program(&pages, &mut NoProgress).unwrap();
        assert_eq!(session.link().flash.len(), 100);
    }

    #[test]
    fn test_verify_mismatch_names_the_page() {
        let mut session = session(Memory {
            stuck: Some((70, 0x00)),
            ..Default::default()
        });
        let err = session.program_image(&image(), &mut NoProgress).unwrap_err();

        assert!(err.is_verify_mismatch());
        match err {
            Error::PageVerify {
                address,
                offset,
                expected,
                actual,
            } => {
                assert_eq!(address, 0x40);
                assert_eq!(offset, 6);
                assert_eq!(expected, 70);
                assert_eq!(actual, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        // Nothing is rolled back
        assert_eq!(session.link().flash.len(), 100);
    }

    #[test]
    fn test_silent_commit_aborts_with_page_address() {
        let mut session = session(Memory {
            silent: Some(Operation::WritePage),
            ..Default::default()
        });
        let err = session.program_image(&image(), &mut NoProgress).unwrap_err();

        assert_eq!(
            err.to_string(),
            "page 0x0000: commit page: no response from programmer"
        );
        assert!(!session.link().log.contains(&Operation::ReadData));
    }

    #[test]
    fn test_program_needs_identified_device() {
        let mut session = session(Memory::default());
        session.device = None;
        assert!(matches!(
            session.program(&[], &mut NoProgress),
            Err(Error::NotIdentified)
        ));
        assert!(session.link().log.is_empty());
    }

    #[test]
    fn test_set_lfuse_only() {
        let mut session = session(Memory {
            fuses: [0x62, 0xDF, 0xFF],
            ..Default::default()
        });
        let written = session.set_fuses(FuseUpdate::lfuse(0xE2)).unwrap();

        assert_eq!(
            written,
            Fuses {
                lfuse: 0xE2,
                hfuse: 0xDF,
                efuse: 0xFF
            }
        );
        assert_eq!(session.read_fuses().unwrap(), written);
        assert_eq!(
            session.link().log,
            vec![Operation::ReadFuses, Operation::WriteFuses, Operation::ReadFuses]
        );
    }

    #[test]
    fn test_eeprom_readback_mismatch() {
        let mut session = session(Memory {
            eeprom_readback: Some(199),
            ..Default::default()
        });
        let err = session.write_eeprom(3, 200).unwrap_err();
        assert!(matches!(
            err,
            Error::EepromVerify {
                address: 3,
                expected: 200,
                actual: 199
            }
        ));

        // Unrelated calls are unaffected
        session.link().eeprom_readback = None;
        session.write_eeprom(4, 17).unwrap();
        assert_eq!(session.read_eeprom(4).unwrap(), 17);
    }
}
