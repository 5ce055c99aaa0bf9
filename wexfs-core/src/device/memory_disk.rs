//! In-memory block device.

use std::collections::HashMap;

use super::block_dev::{BlockDevice, Sector, MAX_LBA, SECTOR_SIZE};
use crate::error::{FsError, FsResult};

/// Sparse in-memory disk. Sectors never written read back as zeros.
#[derive(Default, Clone)]
pub struct MemoryDisk {
    sectors: HashMap<u32, Sector>,
}

impl MemoryDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a raw image (length rounded down to whole sectors).
    pub fn from_image(image: &[u8]) -> Self {
        let sectors = image
            .chunks_exact(SECTOR_SIZE)
            .enumerate()
            .filter(|(_, chunk)| chunk.iter().any(|&b| b != 0))
            .map(|(i, chunk)| {
                let mut sector = [0u8; SECTOR_SIZE];
                sector.copy_from_slice(chunk);
                (i as u32, sector)
            })
            .collect();
        Self { sectors }
    }

    /// Number of sectors that hold data.
    pub fn written_sectors(&self) -> usize {
        self.sectors.len()
    }

    /// Raw view of one sector, if it was ever written.
    pub fn sector(&self, lba: u32) -> Option<&Sector> {
        self.sectors.get(&lba)
    }
}

impl BlockDevice for MemoryDisk {
    fn read_sector(&mut self, lba: u32) -> FsResult<Sector> {
        if lba > MAX_LBA {
            return Err(FsError::LbaOutOfRange(lba));
        }
        Ok(self.sectors.get(&lba).copied().unwrap_or([0; SECTOR_SIZE]))
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> FsResult<()> {
        if lba > MAX_LBA {
            return Err(FsError::LbaOutOfRange(lba));
        }
        self.sectors.insert(lba, *data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritten_sector_is_zero() {
        let mut disk = MemoryDisk::new();
        assert_eq!(disk.read_sector(7).unwrap(), [0; SECTOR_SIZE]);
        assert_eq!(disk.written_sectors(), 0);
    }

    #[test]
    fn test_write_read_sector() {
        let mut disk = MemoryDisk::new();
        let mut data = [0u8; SECTOR_SIZE];
        data[0] = 0xAA;
        data[511] = 0x55;
        disk.write_sector(3, &data).unwrap();

        assert_eq!(disk.read_sector(3).unwrap(), data);
        assert_eq!(disk.written_sectors(), 1);
    }

    #[test]
    fn test_from_image() {
        let mut image = vec![0u8; SECTOR_SIZE * 3];
        image[SECTOR_SIZE * 2] = 9;
        let mut disk = MemoryDisk::from_image(&image);

        assert_eq!(disk.written_sectors(), 1);
        assert_eq!(disk.read_sector(2).unwrap()[0], 9);
    }

    #[test]
    fn test_lba_out_of_range() {
        let mut disk = MemoryDisk::new();
        assert!(matches!(
            disk.read_sector(MAX_LBA + 1),
            Err(FsError::LbaOutOfRange(_))
        ));
    }
}
