//! Copy-on-write overlay block device.

use std::collections::HashMap;

use super::block_dev::{BlockDevice, Sector};
use crate::error::FsResult;

/// Copy-on-write overlay on top of a base device.
///
/// - Reads come from overlay first, then fall back to base
/// - Writes go to overlay only (base is never modified)
pub struct OverlayDisk<B: BlockDevice> {
    base: B,
    overlay: HashMap<u32, Sector>,
}

impl<B: BlockDevice> OverlayDisk<B> {
    pub fn new(base: B) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
        }
    }

    /// Get the underlying base device.
    pub fn base(&self) -> &B {
        &self.base
    }

    /// Get mutable reference to base device.
    pub fn base_mut(&mut self) -> &mut B {
        &mut self.base
    }

    /// Sectors that have been written in the overlay, sorted by LBA.
    pub fn modified_sectors(&self) -> Vec<u32> {
        let mut lbas: Vec<u32> = self.overlay.keys().copied().collect();
        lbas.sort_unstable();
        lbas
    }

    /// Check if a sector was written through the overlay.
    pub fn is_modified(&self, lba: u32) -> bool {
        self.overlay.contains_key(&lba)
    }

    /// Drop all overlay writes.
    pub fn clear_overlay(&mut self) {
        self.overlay.clear();
    }

    /// Consume the overlay, returning the untouched base.
    pub fn into_base(self) -> B {
        self.base
    }
}

impl<B: BlockDevice> BlockDevice for OverlayDisk<B> {
    fn read_sector(&mut self, lba: u32) -> FsResult<Sector> {
        match self.overlay.get(&lba) {
            Some(sector) => Ok(*sector),
            None => self.base.read_sector(lba),
        }
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> FsResult<()> {
        self.overlay.insert(lba, *data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemoryDisk;
    use super::*;
    use crate::device::SECTOR_SIZE;

    fn filled(byte: u8) -> Sector {
        [byte; SECTOR_SIZE]
    }

    #[test]
    fn test_read_from_base() {
        let mut base = MemoryDisk::new();
        base.write_sector(1, &filled(1)).unwrap();

        let mut overlay = OverlayDisk::new(base);
        assert_eq!(overlay.read_sector(1).unwrap(), filled(1));
        assert!(!overlay.is_modified(1));
    }

    #[test]
    fn test_write_to_overlay() {
        let base = MemoryDisk::new();
        let mut overlay = OverlayDisk::new(base);

        overlay.write_sector(5, &filled(7)).unwrap();

        assert_eq!(overlay.read_sector(5).unwrap(), filled(7));
        assert_eq!(overlay.base().written_sectors(), 0); // Base unchanged
        assert_eq!(overlay.modified_sectors(), vec![5]);
    }

    #[test]
    fn test_override_base_sector() {
        let mut base = MemoryDisk::new();
        base.write_sector(2, &filled(1)).unwrap();

        let mut overlay = OverlayDisk::new(base);
        overlay.write_sector(2, &filled(2)).unwrap();

        assert_eq!(overlay.read_sector(2).unwrap(), filled(2));
        assert_eq!(overlay.base_mut().read_sector(2).unwrap(), filled(1));
    }

    #[test]
    fn test_clear_overlay() {
        let mut base = MemoryDisk::new();
        base.write_sector(2, &filled(1)).unwrap();

        let mut overlay = OverlayDisk::new(base);
        overlay.write_sector(2, &filled(3)).unwrap();
        overlay.clear_overlay();

        assert_eq!(overlay.read_sector(2).unwrap(), filled(1));
        assert!(overlay.modified_sectors().is_empty());
    }
}
