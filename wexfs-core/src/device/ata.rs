//! PIO ATA driver over a port bus, plus an emulated controller.
//!
//! The driver talks to the legacy primary channel registers:
//! - 0x1F0: 16-bit data port
//! - 0x1F2: sector count
//! - 0x1F3..0x1F5: LBA bits 0-23
//! - 0x1F6: drive select + LBA bits 24-27
//! - 0x1F7: command (write) / status (read)
//!
//! Transfers are one sector at a time and poll the status register with no
//! timeout.

use std::collections::HashSet;

use log::warn;

use super::block_dev::{BlockDevice, Sector, MAX_LBA, SECTOR_SIZE};
use crate::error::{FsError, FsResult};

/// Register ports.
pub mod port {
    pub const DATA: u16 = 0x1F0;
    pub const SECTOR_COUNT: u16 = 0x1F2;
    pub const LBA_LOW: u16 = 0x1F3;
    pub const LBA_MID: u16 = 0x1F4;
    pub const LBA_HIGH: u16 = 0x1F5;
    pub const DEVICE: u16 = 0x1F6;
    /// Command on write, status on read.
    pub const COMMAND: u16 = 0x1F7;
    pub const STATUS: u16 = 0x1F7;
}

/// Status register bits.
pub mod status {
    pub const ERR: u8 = 0x01;
    pub const DRQ: u8 = 0x08;
    pub const DRDY: u8 = 0x40;
    pub const BSY: u8 = 0x80;
}

/// Command opcodes.
pub mod command {
    pub const READ_SECTORS: u8 = 0x20;
    pub const WRITE_SECTORS: u8 = 0x30;
}

/// Master drive, LBA addressing.
const DEVICE_LBA_MASTER: u8 = 0xE0;

const WORDS_PER_SECTOR: usize = SECTOR_SIZE / 2;

/// Port I/O primitives used by the driver.
pub trait AtaBus: Send {
    fn inb(&mut self, port: u16) -> u8;
    fn outb(&mut self, port: u16, value: u8);
    fn inw(&mut self, port: u16) -> u16;
    fn outw(&mut self, port: u16, value: u16);
}

/// ATA disk driven through an [`AtaBus`].
pub struct AtaDisk<B: AtaBus> {
    bus: B,
}

impl<B: AtaBus> AtaDisk<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    fn wait_ready(&mut self) -> u8 {
        loop {
            let st = self.bus.inb(port::STATUS);
            if st & status::BSY == 0 {
                return st;
            }
        }
    }

    /// Poll until DRQ is set. Returns false if the drive flags an error instead.
    fn wait_drq(&mut self) -> bool {
        loop {
            let st = self.bus.inb(port::STATUS);
            if st & status::ERR != 0 {
                return false;
            }
            if st & status::DRQ != 0 {
                return true;
            }
        }
    }

    fn issue(&mut self, lba: u32, cmd: u8) {
        self.bus
            .outb(port::DEVICE, DEVICE_LBA_MASTER | ((lba >> 24) & 0x0F) as u8);
        self.bus.outb(port::SECTOR_COUNT, 1);
        self.bus.outb(port::LBA_LOW, lba as u8);
        self.bus.outb(port::LBA_MID, (lba >> 8) as u8);
        self.bus.outb(port::LBA_HIGH, (lba >> 16) as u8);
        self.bus.outb(port::COMMAND, cmd);
    }
}

impl<B: AtaBus> BlockDevice for AtaDisk<B> {
    fn read_sector(&mut self, lba: u32) -> FsResult<Sector> {
        if lba > MAX_LBA {
            return Err(FsError::LbaOutOfRange(lba));
        }
        self.issue(lba, command::READ_SECTORS);

        if self.wait_ready() & status::ERR != 0 || !self.wait_drq() {
            warn!("ATA read error at LBA {}", lba);
            return Err(FsError::DeviceRead { lba });
        }

        let mut buf = [0u8; SECTOR_SIZE];
        for i in 0..WORDS_PER_SECTOR {
            let word = self.bus.inw(port::DATA);
            buf[i * 2] = word as u8;
            buf[i * 2 + 1] = (word >> 8) as u8;
        }
        Ok(buf)
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> FsResult<()> {
        if lba > MAX_LBA {
            return Err(FsError::LbaOutOfRange(lba));
        }
        self.issue(lba, command::WRITE_SECTORS);

        self.wait_ready();
        if !self.wait_drq() {
            warn!("ATA write error at LBA {}", lba);
            return Err(FsError::DeviceWrite { lba });
        }

        for i in 0..WORDS_PER_SECTOR {
            let word = u16::from_le_bytes([data[i * 2], data[i * 2 + 1]]);
            self.bus.outw(port::DATA, word);
        }

        if self.wait_ready() & status::ERR != 0 {
            warn!("ATA write error at LBA {}", lba);
            return Err(FsError::DeviceWrite { lba });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transfer {
    Idle,
    Reading,
    Writing,
}

/// Emulated single-drive ATA controller backed by a byte image.
///
/// After each command the status register reports BSY for `busy_cycles`
/// reads. LBAs registered with [`fail_reads`](Self::fail_reads) or
/// [`fail_writes`](Self::fail_writes) complete with ERR set.
pub struct EmulatedAtaBus {
    image: Vec<u8>,
    lba: u32,
    sector_count: u8,
    status: u8,
    busy_left: u32,
    busy_cycles: u32,
    buffer: Sector,
    pos: usize,
    transfer: Transfer,
    failing_reads: HashSet<u32>,
    failing_writes: HashSet<u32>,
    commands: u64,
}

impl EmulatedAtaBus {
    /// Create a blank disk of `sectors` sectors.
    pub fn new(sectors: u32) -> Self {
        Self::with_image(vec![0; sectors as usize * SECTOR_SIZE])
    }

    /// Create from an existing image (padded to a whole sector).
    pub fn with_image(mut image: Vec<u8>) -> Self {
        let rem = image.len() % SECTOR_SIZE;
        if rem != 0 {
            image.resize(image.len() + SECTOR_SIZE - rem, 0);
        }
        Self {
            image,
            lba: 0,
            sector_count: 0,
            status: status::DRDY,
            busy_left: 0,
            busy_cycles: 2,
            buffer: [0; SECTOR_SIZE],
            pos: 0,
            transfer: Transfer::Idle,
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
            commands: 0,
        }
    }

    /// Number of BSY status reads reported after each command.
    pub fn set_busy_cycles(&mut self, cycles: u32) {
        self.busy_cycles = cycles;
    }

    /// Make reads of `lba` fail.
    pub fn fail_reads(&mut self, lba: u32) {
        self.failing_reads.insert(lba);
    }

    /// Make writes to `lba` fail.
    pub fn fail_writes(&mut self, lba: u32) {
        self.failing_writes.insert(lba);
    }

    /// Clear all injected faults.
    pub fn clear_faults(&mut self) {
        self.failing_reads.clear();
        self.failing_writes.clear();
    }

    /// Raw disk image.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Commands accepted so far.
    pub fn commands_issued(&self) -> u64 {
        self.commands
    }

    fn sectors(&self) -> u32 {
        (self.image.len() / SECTOR_SIZE) as u32
    }

    fn range(&self) -> std::ops::Range<usize> {
        let start = self.lba as usize * SECTOR_SIZE;
        start..start + SECTOR_SIZE
    }

    fn start_command(&mut self, cmd: u8) {
        self.commands += 1;
        self.busy_left = self.busy_cycles;
        self.pos = 0;
        let in_range = self.lba < self.sectors() && self.sector_count == 1;

        match cmd {
            command::READ_SECTORS => {
                if !in_range || self.failing_reads.contains(&self.lba) {
                    self.fault();
                    return;
                }
                let range = self.range();
                self.buffer.copy_from_slice(&self.image[range]);
                self.transfer = Transfer::Reading;
                self.status = status::DRDY | status::DRQ;
            }
            command::WRITE_SECTORS => {
                if !in_range {
                    self.fault();
                    return;
                }
                self.transfer = Transfer::Writing;
                self.status = status::DRDY | status::DRQ;
            }
            _ => self.fault(),
        }
    }

    fn fault(&mut self) {
        self.transfer = Transfer::Idle;
        self.status = status::DRDY | status::ERR;
    }

    fn finish_write(&mut self) {
        self.transfer = Transfer::Idle;
        self.busy_left = self.busy_cycles;
        if self.failing_writes.contains(&self.lba) {
            self.status = status::DRDY | status::ERR;
            return;
        }
        let range = self.range();
        self.image[range].copy_from_slice(&self.buffer);
        self.status = status::DRDY;
    }
}

impl AtaBus for EmulatedAtaBus {
    fn inb(&mut self, port: u16) -> u8 {
        match port {
            port::STATUS => {
                if self.busy_left > 0 {
                    self.busy_left -= 1;
                    status::BSY
                } else {
                    self.status
                }
            }
            port::SECTOR_COUNT => self.sector_count,
            port::LBA_LOW => self.lba as u8,
            port::LBA_MID => (self.lba >> 8) as u8,
            port::LBA_HIGH => (self.lba >> 16) as u8,
            port::DEVICE => DEVICE_LBA_MASTER | ((self.lba >> 24) & 0x0F) as u8,
            _ => 0xFF,
        }
    }

    fn outb(&mut self, port: u16, value: u8) {
        match port {
            port::SECTOR_COUNT => self.sector_count = value,
            port::LBA_LOW => self.lba = (self.lba & !0xFF) | value as u32,
            port::LBA_MID => self.lba = (self.lba & !0xFF00) | ((value as u32) << 8),
            port::LBA_HIGH => self.lba = (self.lba & !0xFF_0000) | ((value as u32) << 16),
            port::DEVICE => {
                self.lba = (self.lba & 0x00FF_FFFF) | (((value & 0x0F) as u32) << 24)
            }
            port::COMMAND => self.start_command(value),
            _ => {}
        }
    }

    fn inw(&mut self, port: u16) -> u16 {
        if port != port::DATA || self.transfer != Transfer::Reading {
            return 0xFFFF;
        }
        let word = u16::from_le_bytes([self.buffer[self.pos], self.buffer[self.pos + 1]]);
        self.pos += 2;
        if self.pos == SECTOR_SIZE {
            self.transfer = Transfer::Idle;
            self.status = status::DRDY;
        }
        word
    }

    fn outw(&mut self, port: u16, value: u16) {
        if port != port::DATA || self.transfer != Transfer::Writing {
            return;
        }
        let [lo, hi] = value.to_le_bytes();
        self.buffer[self.pos] = lo;
        self.buffer[self.pos + 1] = hi;
        self.pos += 2;
        if self.pos == SECTOR_SIZE {
            self.finish_write();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> Sector {
        let mut data = [0u8; SECTOR_SIZE];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        data
    }

    #[test]
    fn test_write_then_read() {
        let mut disk = AtaDisk::new(EmulatedAtaBus::new(8));
        disk.write_sector(3, &pattern()).unwrap();
        assert_eq!(disk.read_sector(3).unwrap(), pattern());
        assert_eq!(disk.bus().commands_issued(), 2);
    }

    #[test]
    fn test_words_are_low_byte_first() {
        let mut image = vec![0u8; SECTOR_SIZE * 2];
        image[SECTOR_SIZE] = 0x34;
        image[SECTOR_SIZE + 1] = 0x12;
        let mut bus = EmulatedAtaBus::with_image(image);

        bus.outb(port::DEVICE, 0xE0);
        bus.outb(port::SECTOR_COUNT, 1);
        bus.outb(port::LBA_LOW, 1);
        bus.outb(port::LBA_MID, 0);
        bus.outb(port::LBA_HIGH, 0);
        bus.outb(port::COMMAND, command::READ_SECTORS);
        while bus.inb(port::STATUS) & status::BSY != 0 {}
        assert_eq!(bus.inw(port::DATA), 0x1234);
    }

    #[test]
    fn test_polls_through_busy() {
        let mut bus = EmulatedAtaBus::new(4);
        bus.set_busy_cycles(50);
        let mut disk = AtaDisk::new(bus);
        disk.write_sector(1, &pattern()).unwrap();
        assert_eq!(disk.read_sector(1).unwrap(), pattern());
    }

    #[test]
    fn test_read_error() {
        let mut bus = EmulatedAtaBus::new(4);
        bus.fail_reads(2);
        let mut disk = AtaDisk::new(bus);
        assert!(matches!(
            disk.read_sector(2),
            Err(FsError::DeviceRead { lba: 2 })
        ));
        // Other sectors still work
        assert!(disk.read_sector(1).is_ok());
    }

    #[test]
    fn test_write_error_leaves_image_untouched() {
        let mut bus = EmulatedAtaBus::new(4);
        bus.fail_writes(1);
        let mut disk = AtaDisk::new(bus);
        assert!(matches!(
            disk.write_sector(1, &pattern()),
            Err(FsError::DeviceWrite { lba: 1 })
        ));
        let bus = disk.into_bus();
        assert!(bus.image()[SECTOR_SIZE..SECTOR_SIZE * 2]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn test_out_of_range_sector() {
        let mut disk = AtaDisk::new(EmulatedAtaBus::new(2));
        assert!(matches!(
            disk.read_sector(5),
            Err(FsError::DeviceRead { lba: 5 })
        ));
        assert!(matches!(
            disk.write_sector(5, &pattern()),
            Err(FsError::DeviceWrite { lba: 5 })
        ));
        assert!(matches!(
            disk.read_sector(MAX_LBA + 1),
            Err(FsError::LbaOutOfRange(_))
        ));
    }

    #[test]
    fn test_high_lba_bits_reach_device_register() {
        let mut bus = EmulatedAtaBus::new(1);
        bus.outb(port::DEVICE, 0xE0 | 0x0A);
        bus.outb(port::LBA_HIGH, 0x01);
        assert_eq!(bus.inb(port::DEVICE) & 0x0F, 0x0A);
        assert_eq!(bus.inb(port::LBA_HIGH), 0x01);
    }
}
