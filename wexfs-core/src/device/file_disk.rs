//! Disk image file on the host.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::warn;

use super::block_dev::{BlockDevice, Sector, MAX_LBA, SECTOR_SIZE};
use crate::error::{FsError, FsResult};

/// Raw disk image backed by a regular file.
///
/// Sectors past the end of the file read as zeros; writing past the end
/// grows the file.
pub struct FileDisk {
    file: File,
}

impl FileDisk {
    /// Open an existing image for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> FsResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Create a zero-filled image of `sectors` sectors, or open it if it exists.
    pub fn create(path: impl AsRef<Path>, sectors: u32) -> FsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let wanted = sectors as u64 * SECTOR_SIZE as u64;
        if file.metadata()?.len() < wanted {
            file.set_len(wanted)?;
        }
        Ok(Self { file })
    }

    /// Image length in whole sectors.
    pub fn sector_count(&self) -> FsResult<u64> {
        Ok(self.file.metadata()?.len() / SECTOR_SIZE as u64)
    }

    fn read_at(&mut self, lba: u32, buf: &mut Sector) -> std::io::Result<()> {
        let offset = lba as u64 * SECTOR_SIZE as u64;
        if offset >= self.file.metadata()?.len() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < SECTOR_SIZE {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break; // short image, rest stays zero
            }
            filled += n;
        }
        Ok(())
    }

    fn write_at(&mut self, lba: u32, data: &Sector) -> std::io::Result<()> {
        self.file
            .seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))?;
        self.file.write_all(data)?;
        self.file.flush()
    }
}

impl BlockDevice for FileDisk {
    fn read_sector(&mut self, lba: u32) -> FsResult<Sector> {
        if lba > MAX_LBA {
            return Err(FsError::LbaOutOfRange(lba));
        }
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_at(lba, &mut buf).map_err(|e| {
            warn!("image read failed at LBA {}: {}", lba, e);
            FsError::DeviceRead { lba }
        })?;
        Ok(buf)
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> FsResult<()> {
        if lba > MAX_LBA {
            return Err(FsError::LbaOutOfRange(lba));
        }
        self.write_at(lba, data).map_err(|e| {
            warn!("image write failed at LBA {}: {}", lba, e);
            FsError::DeviceWrite { lba }
        })
    }
}
