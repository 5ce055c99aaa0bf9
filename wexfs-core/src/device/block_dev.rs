//! BlockDevice trait - sector-level interface the filesystem persists through.

use crate::error::FsResult;

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 512;

/// Highest address reachable with 28-bit LBA.
pub const MAX_LBA: u32 = 0x0FFF_FFFF;

/// One sector of data.
pub type Sector = [u8; SECTOR_SIZE];

/// Sector-addressed block device.
///
/// Every call is synchronous and moves exactly one sector. A failed transfer
/// is reported once; callers do not retry.
pub trait BlockDevice: Send {
    /// Read the sector at `lba`.
    fn read_sector(&mut self, lba: u32) -> FsResult<Sector>;

    /// Write `data` to the sector at `lba`.
    fn write_sector(&mut self, lba: u32, data: &Sector) -> FsResult<()>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for Box<T> {
    fn read_sector(&mut self, lba: u32) -> FsResult<Sector> {
        (**self).read_sector(lba)
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> FsResult<()> {
        (**self).write_sector(lba, data)
    }
}
