//! upp-sim - Simulated programmer node for testing
//!
//! This crate provides a programmer node with a chip seated in one of its
//! socket interfaces, all in memory. The chip only enters programming mode
//! when the node has been configured with the pins it is actually wired to,
//! so discovery behaves as it does on hardware.

use std::collections::{BTreeMap, BTreeSet};

use upp_core::chip::DeviceDescriptor;
use upp_core::flash::{Fuses, ERASED};
use upp_core::programmer::Transaction;
use upp_core::protocol::{field, Operation, Packet, Request, Response, PROG_INIT_OK};
use upp_core::socket::{SignalMap, SocketInterface};

/// Response code for a refused programming-mode init
const PROG_INIT_REFUSED: u8 = 0;

/// Configuration for the simulated node
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// The installed chip
    pub device: DeviceDescriptor,
    /// The interface the chip is installed in
    pub interface: SocketInterface,
    /// Program memory size in bytes
    pub flash_size: usize,
    /// Fuse values at power-up
    pub fuses: Fuses,
    /// Signature the node remembers from an earlier session
    pub last_signature: u32,
}

impl SimConfig {
    /// A chip installed in `interface` with factory fuses
    pub fn new(device: DeviceDescriptor, interface: SocketInterface) -> Self {
        Self {
            device,
            interface,
            flash_size: 8 * 1024,
            fuses: Fuses {
                lfuse: 0x62,
                hfuse: 0xDF,
                efuse: 0xFF,
            },
            last_signature: 0,
        }
    }
}

/// Doppel bus state on the node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoppelState {
    /// Internal (scl, sda) pins, once configured
    pub pins: Option<(u8, u8)>,
    /// Whether incoming messages are buffered
    pub receiving: bool,
    /// Whether the node is back in free-running mode
    pub free_running: bool,
    /// Raw buffered frames
    pub buffer: Vec<u8>,
    /// Messages sent by the host, as (address, payload)
    pub sent: Vec<(u8, Vec<u8>)>,
}

/// Simulated programmer node with an installed chip
pub struct SimulatedUpp {
    config: SimConfig,
    wiring: Option<SignalMap>,
    configured: Option<SignalMap>,
    programming: bool,
    running: bool,
    flash: Vec<u8>,
    page_buffer: BTreeMap<u16, u8>,
    fuses: Fuses,
    eeprom: [u8; 256],
    last_signature: u32,
    pin_levels: BTreeMap<u8, u8>,
    doppel: DoppelState,
    silent: BTreeSet<Operation>,
    eeprom_readback: Option<u8>,
    stuck: Vec<(u16, u8)>,
    requests: Vec<Request>,
}

impl SimulatedUpp {
    /// Create a node with the configured chip installed
    ///
    /// A chip that cannot be mapped onto its interface never answers init.
    pub fn new(config: SimConfig) -> Self {
        let wiring = match config.interface.programming_pins(&config.device) {
            Ok(pins) => Some(pins),
            Err(e) => {
                log::warn!(
                    "sim: {} cannot be wired in {}: {}",
                    config.device,
                    config.interface,
                    e
                );
                None
            }
        };
        Self {
            flash: vec![ERASED; config.flash_size],
            fuses: config.fuses,
            last_signature: config.last_signature,
            config,
            wiring,
            configured: None,
            programming: false,
            running: false,
            page_buffer: BTreeMap::new(),
            eeprom: [ERASED; 256],
            pin_levels: BTreeMap::new(),
            doppel: DoppelState::default(),
            silent: BTreeSet::new(),
            eeprom_readback: None,
            stuck: Vec::new(),
            requests: Vec::new(),
        }
    }

    /// The configuration this node was built with
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Program memory contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Current fuse values
    pub fn fuses(&self) -> Fuses {
        self.fuses
    }

    /// EEPROM contents
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// Whether the chip is in programming mode
    pub fn in_programming_mode(&self) -> bool {
        self.programming
    }

    /// Whether the chip has been released to run
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Doppel bus state
    pub fn doppel(&self) -> &DoppelState {
        &self.doppel
    }

    /// Every request received, in order
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Operations received, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.requests.iter().map(|r| r.operation).collect()
    }

    /// Set the level an internal pin reads back
    pub fn set_pin_level(&mut self, pin: u8, level: u8) {
        self.pin_levels.insert(pin, level);
    }

    /// Deliver a message from the chip side of the doppel bus
    ///
    /// Dropped unless the receiver is enabled.
    pub fn inject_message(&mut self, payload: &[u8]) {
        if !self.doppel.receiving {
            log::debug!("sim: doppel receiver off, dropping {} bytes", payload.len());
            return;
        }
        self.doppel.buffer.push(payload.len() as u8);
        self.doppel.buffer.extend_from_slice(payload);
    }

    /// Append raw bytes to the doppel buffer
    pub fn inject_raw(&mut self, bytes: &[u8]) {
        self.doppel.buffer.extend_from_slice(bytes);
    }

    /// Never answer `operation`
    pub fn silence(&mut self, operation: Operation) {
        self.silent.insert(operation);
    }

    /// Make every EEPROM read return `value`
    pub fn force_eeprom_readback(&mut self, value: Option<u8>) {
        self.eeprom_readback = value;
    }

    /// Force a flash byte to `value` whenever a page is committed
    pub fn stick_flash_byte(&mut self, address: u16, value: u8) {
        self.stuck.push((address, value));
    }

    fn page_size(&self) -> usize {
        usize::from(self.config.device.page_size.unwrap_or(64))
    }

    fn configure_chip(&mut self, packet: &Packet) {
        let pins: SignalMap = Operation::ConfigureChip
            .request_fields()
            .iter()
            .filter_map(|f| Some((f.name.to_string(), packet.uint(f.name)? as u8)))
            .collect();
        log::debug!("sim: configured {:?}", pins);
        self.configured = Some(pins);
        self.programming = false;
        self.running = false;
    }

    fn init(&mut self) -> u8 {
        if self.wiring.is_some() && self.configured == self.wiring {
            self.programming = true;
            self.running = false;
            self.last_signature = self.config.device.signature.unwrap_or(0);
            PROG_INIT_OK
        } else {
            self.programming = false;
            PROG_INIT_REFUSED
        }
    }

    fn commit(&mut self, page_address: u16) {
        let page_size = self.page_size();
        let page_start = usize::from(page_address) / page_size * page_size;
        for (addr, byte) in std::mem::take(&mut self.page_buffer) {
            let addr = usize::from(addr);
            if addr < page_start || addr >= page_start + page_size {
                log::warn!("sim: byte 0x{:04X} outside page 0x{:04X} dropped", addr, page_start);
                continue;
            }
            if let Some(cell) = self.flash.get_mut(addr) {
                // Flash programming can only clear bits
                *cell &= byte;
            }
        }
        for &(addr, value) in &self.stuck {
            if let Some(cell) = self.flash.get_mut(usize::from(addr)) {
                *cell = value;
            }
        }
    }

    fn read_data(&self, base: u16, size: usize) -> Vec<u8> {
        (usize::from(base)..usize::from(base) + size)
            .map(|a| self.flash.get(a).copied().unwrap_or(ERASED))
            .collect()
    }

    fn is_configured(&self) -> Packet {
        Packet::new().with_uint(field::IS_CONFIGURED, u32::from(self.doppel.pins.is_some()))
    }

    /// Handle a request, or `None` if the node stays silent
    fn handle(&mut self, request: &Request) -> Option<Packet> {
        let packet = &request.packet;
        let uint = |name: &str| packet.uint(name).unwrap_or(0);
        let needs_chip = matches!(
            request.operation,
            Operation::ReadSignature
                | Operation::ReadFuses
                | Operation::WriteFuses
                | Operation::EraseChip
                | Operation::LoadData
                | Operation::WritePage
                | Operation::ReadData
                | Operation::WriteEeprom
                | Operation::ReadEeprom
        );
        if needs_chip && !self.programming {
            log::debug!("sim: {} outside programming mode", request.operation);
            return None;
        }

        let reply = match request.operation {
            Operation::ConfigureChip => {
                self.configure_chip(packet);
                Packet::new()
            }
            Operation::ProgInit => {
                Packet::new().with_uint(field::RESPONSE_CODE, u32::from(self.init()))
            }
            Operation::ReadSignature => Packet::new().with_uint(
                field::SIGNATURE_BYTES,
                self.config.device.signature.unwrap_or(0),
            ),
            Operation::LastKnownSignature => {
                Packet::new().with_uint(field::SIGNATURE_BYTES, self.last_signature)
            }
            Operation::ReadFuses => Packet::new()
                .with_uint(field::LFUSE, self.fuses.lfuse.into())
                .with_uint(field::HFUSE, self.fuses.hfuse.into())
                .with_uint(field::EFUSE, self.fuses.efuse.into()),
            Operation::WriteFuses => {
                self.fuses = Fuses {
                    lfuse: uint(field::LFUSE) as u8,
                    hfuse: uint(field::HFUSE) as u8,
                    efuse: uint(field::EFUSE) as u8,
                };
                Packet::new()
            }
            Operation::EraseChip => {
                self.flash.fill(ERASED);
                self.page_buffer.clear();
                Packet::new()
            }
            Operation::LoadData => {
                let base = uint(field::BYTE_BASE_ADDRESS) as u16;
                let data = packet.list(field::DATA).unwrap_or(&[]);
                if data.len() != uint(field::DATA_SIZE) as usize {
                    log::warn!("sim: dataSize does not match data length");
                }
                for (addr, byte) in (base..=u16::MAX).zip(data) {
                    self.page_buffer.insert(addr, *byte);
                }
                Packet::new()
            }
            Operation::WritePage => {
                self.commit(uint(field::BYTE_PAGE_ADDRESS) as u16);
                Packet::new()
            }
            Operation::ReadData => {
                let data = self.read_data(
                    uint(field::BYTE_BASE_ADDRESS) as u16,
                    uint(field::DATA_SIZE) as usize,
                );
                Packet::new().with_list(field::DATA, data)
            }
            Operation::WriteEeprom => {
                self.eeprom[uint(field::ADDRESS) as usize & 0xFF] = uint(field::DATA) as u8;
                Packet::new()
            }
            Operation::ReadEeprom => {
                let stored = self.eeprom[uint(field::ADDRESS) as usize & 0xFF];
                let value = self.eeprom_readback.unwrap_or(stored);
                Packet::new().with_uint(field::DATA, value.into())
            }
            Operation::RunChip => {
                self.programming = false;
                self.running = true;
                Packet::new()
            }
            Operation::ReadInternalPin => {
                let pin = uint(field::PIN) as u8;
                let level = self.pin_levels.get(&pin).copied().unwrap_or(0);
                Packet::new().with_uint(field::VALUE, level.into())
            }
            Operation::ConfigureDoppel => {
                self.doppel.pins = Some((uint(field::SCL_PIN) as u8, uint(field::SDA_PIN) as u8));
                self.doppel.free_running = false;
                Packet::new()
            }
            Operation::EnableDoppelReceiver => {
                if self.doppel.pins.is_some() {
                    self.doppel.receiving = true;
                }
                self.is_configured()
            }
            Operation::SendDoppelMessage => {
                if self.doppel.pins.is_some() {
                    let message = packet.list(field::MESSAGE).unwrap_or(&[]).to_vec();
                    if uint(field::PACKET_LENGTH) as usize != message.len() + 1 {
                        log::warn!("sim: doppel packetLength does not match message");
                    }
                    self.doppel
                        .sent
                        .push((uint(field::ADDRESS) as u8, message));
                }
                self.is_configured()
            }
            Operation::ReadDoppelMessages => {
                Packet::new().with_list(field::MESSAGE, self.doppel.buffer.clone())
            }
            Operation::ResetDoppelBuffer => {
                self.doppel.buffer.clear();
                Packet::new()
            }
            Operation::EnterFreeRunningMode => {
                self.doppel.receiving = false;
                self.doppel.free_running = true;
                Packet::new()
            }
        };
        Some(reply)
    }
}

impl Transaction for SimulatedUpp {
    fn transact(&mut self, request: &Request) -> Option<Response> {
        self.requests.push(request.clone());
        if self.silent.contains(&request.operation) {
            log::debug!("sim: staying silent on {}", request.operation);
            return None;
        }
        let packet = self.handle(request)?;
        Some(Response::with_packet(request.operation, packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_core::chip::Catalog;
    use upp_core::error::{ConfigError, Error};
    use upp_core::flash::{FlashImage, FuseUpdate, NoProgress};
    use upp_core::socket::Pin;
    use upp_core::Session;

    fn sim(chip: &str, interface: &str) -> SimulatedUpp {
        let catalog = Catalog::builtin().unwrap();
        let device = catalog.registry.find_by_name(chip).unwrap().clone();
        let interface = catalog.find_interface(interface).unwrap().clone();
        SimulatedUpp::new(SimConfig::new(device, interface))
    }

    fn session(node: SimulatedUpp) -> Session<SimulatedUpp> {
        Session::new(node, Catalog::builtin().unwrap()).unwrap()
    }

    fn image() -> FlashImage {
        let mut image = FlashImage::new();
        image.add_data(0, &(0..=200).collect::<Vec<u8>>());
        image
    }

    #[test]
    fn test_identify_each_tiny_in_zif() {
        for (chip, prototype) in [
            ("ATTiny85", "attiny_8pin"),
            ("ATTiny44", "attiny_14pin"),
            ("ATTiny2313", "attiny_20pin"),
        ] {
            let mut session = session(sim(chip, "ZIF SOCKET"));
            assert_eq!(session.discover_configuration().unwrap().name, prototype);
            assert_eq!(session.identify().unwrap().name, chip);
            assert_eq!(session.active_interface().name(), "ZIF SOCKET");
            assert!(session.link().in_programming_mode());
        }
    }

    #[test]
    fn test_identify_mega_on_isp_cable() {
        let mut session = session(sim("ATMega328", "EXTERNAL ISP CABLE"));
        assert_eq!(session.identify().unwrap().name, "ATMega328");
        assert_eq!(session.active_interface().name(), "EXTERNAL ISP CABLE");
    }

    #[test]
    fn test_empty_socket() {
        let mut node = sim("ATTiny85", "ZIF SOCKET");
        node.silence(Operation::ProgInit);
        let mut session = session(node);
        assert!(matches!(session.identify(), Err(Error::NoDeviceResponded)));
    }

    #[test]
    fn test_program_image_and_reprogram() {
        let mut session = session(sim("ATTiny85", "ZIF SOCKET"));
        session.identify().unwrap();

        let image = image();
        assert_eq!(session.program_image(&image, &mut NoProgress).unwrap(), 4);
        assert_eq!(&session.link().flash()[..201], &(0..=200).collect::<Vec<u8>>()[..]);
        assert_eq!(session.link().flash()[201], ERASED);

        // Erase first, so the same image verifies the same way again
        assert_eq!(session.program_image(&image, &mut NoProgress).unwrap(), 4);
    }

    #[test]
    fn test_program_last_page_of_64k_flash() {
        let catalog = Catalog::builtin().unwrap();
        let mut config = SimConfig::new(
            catalog.registry.find_by_name("ATTiny85").unwrap().clone(),
            catalog.find_interface("ZIF SOCKET").unwrap().clone(),
        );
        config.flash_size = 0x10000;
        let mut session = session(SimulatedUpp::new(config));
        session.identify().unwrap();

        let mut image = FlashImage::new();
        image.add_data(0xFFC0, &[0xA5; 64]);
        assert_eq!(session.program_image(&image, &mut NoProgress).unwrap(), 1);
        assert_eq!(&session.link().flash()[0xFFC0..], &[0xA5; 64][..]);
        assert_eq!(session.link().flash()[0xFFBF], ERASED);
    }

    #[test]
    fn test_stuck_byte_fails_verify_after_all_writes() {
        let mut node = sim("ATTiny44", "ZIF SOCKET");
        node.stick_flash_byte(130, 0);
        let mut session = session(node);
        session.identify().unwrap();

        let err = session.program_image(&image(), &mut NoProgress).unwrap_err();
        assert!(matches!(
            err,
            Error::PageVerify {
                address: 128,
                offset: 2,
                expected: 130,
                actual: 0
            }
        ));

        let ops = session.link().operations();
        let writes = ops.iter().filter(|op| **op == Operation::WritePage).count();
        let first_read = ops.iter().position(|op| *op == Operation::ReadData).unwrap();
        let last_write = ops.iter().rposition(|op| *op == Operation::WritePage).unwrap();
        assert_eq!(writes, 4);
        assert!(last_write < first_read);
    }

    #[test]
    fn test_unknown_page_size() {
        let mut session = session(sim("ATTiny2313", "ZIF SOCKET"));
        session.identify().unwrap();
        assert!(matches!(
            session.program_image(&image(), &mut NoProgress),
            Err(Error::Config(ConfigError::NoPageSize { .. }))
        ));
    }

    #[test]
    fn test_fuses_and_eeprom() {
        let mut session = session(sim("ATTiny85", "ZIF SOCKET"));
        session.identify().unwrap();

        session.set_fuses(FuseUpdate::lfuse(0xE2)).unwrap();
        assert_eq!(
            session.read_fuses().unwrap(),
            Fuses {
                lfuse: 0xE2,
                hfuse: 0xDF,
                efuse: 0xFF
            }
        );

        session.write_eeprom(3, 200).unwrap();
        assert_eq!(session.read_eeprom(3).unwrap(), 200);

        session.link().force_eeprom_readback(Some(199));
        let err = session.write_eeprom(3, 200).unwrap_err();
        assert_eq!(
            err.to_string(),
            "EEPROM verify error at address 3: wrote 200, read back 199"
        );
    }

    #[test]
    fn test_run_then_read_chip_pin_from_last_signature() {
        let mut node = sim("ATTiny85", "ZIF SOCKET");
        // PB0 is package pin 5, transposed to socket pin 17
        node.set_pin_level(17, 1);
        let mut session = session(node);
        session.identify().unwrap();
        session.run_chip().unwrap();
        assert!(session.link().is_running());

        // A fresh session knows nothing but the node's memory
        let mut session = Session::new(session.into_link(), Catalog::builtin().unwrap()).unwrap();
        assert_eq!(session.read_chip_pin(&Pin::Named("PB0".into())).unwrap(), 1);
        assert_eq!(session.read_chip_pin(&Pin::Numbered(5)).unwrap(), 1);
        assert_eq!(session.read_chip_pin(&Pin::Numbered(2)).unwrap(), 0);
    }

    #[test]
    fn test_doppel_session() {
        let mut node = sim("ATTiny85", "ZIF SOCKET");
        node.inject_message(&[1, 2, 3]);
        let mut session = session(node);

        let mut relay = session.doppel();
        assert!(relay.enable_receiver().is_err());
        assert_eq!(relay.configure(None, None).unwrap(), (19, 18));
        relay.enable_receiver().unwrap();
        relay.send_message(0x10, b"hi").unwrap();

        session.link().inject_message(&[10, 20, 30]);
        session.link().inject_message(&[1, 2]);
        session.link().inject_raw(&[9, 1]);

        let mut relay = session.doppel();
        assert_eq!(
            relay.read_messages().unwrap(),
            vec![vec![10, 20, 30], vec![1, 2]]
        );
        relay.reset_message_buffer().unwrap();
        assert!(relay.read_messages().unwrap().is_empty());
        relay.enter_free_running_mode().unwrap();

        let doppel = session.link().doppel();
        assert_eq!(doppel.sent, vec![(0x10, b"hi".to_vec())]);
        assert!(doppel.free_running);
        assert!(!doppel.receiving);
    }
}
