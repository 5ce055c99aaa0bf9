//! Table record and its on-disk encoding.
//!
//! A record is stored as a run of consecutive sectors.
//!
//! Layout (5132 bytes, little endian, zero padded to 11 sectors):
//! - Bytes 0-1023: Name (NUL-terminated)
//! - Bytes 1024-1027: Directory flag (i32, non-zero = directory)
//! - Bytes 1028-5123: Content
//! - Bytes 5124-5127: Next sector (chain pointer)
//! - Bytes 5128-5131: Content size

use std::fmt;

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::error::{FsError, FsResult};

/// Size of the name field, including the terminating NUL.
pub const NAME_FIELD: usize = 1024;

/// Longest storable path.
pub const MAX_PATH_LEN: usize = NAME_FIELD - 1;

/// Capacity of the content buffer.
pub const CONTENT_SIZE: usize = 4096;

const OFF_IS_DIR: usize = NAME_FIELD;
const OFF_CONTENT: usize = OFF_IS_DIR + 4;
const OFF_NEXT: usize = OFF_CONTENT + CONTENT_SIZE;
const OFF_SIZE: usize = OFF_NEXT + 4;

/// Encoded record length in bytes.
pub const RECORD_BYTES: usize = OFF_SIZE + 4;

/// Sectors occupied by one record.
pub const SECTORS_PER_RECORD: usize = RECORD_BYTES.div_ceil(SECTOR_SIZE);

const _: () = assert!(SECTORS_PER_RECORD == 11);

/// Name of the root directory record.
pub const ROOT: &str = "/";

/// One file or directory entry.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    name: String,
    is_dir: bool,
    content: Box<[u8; CONTENT_SIZE]>,
    size: u32,
    next_sector: u32,
}

impl Record {
    /// Empty file record.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name.into(), false)
    }

    /// Directory record.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name.into(), true)
    }

    /// The root directory.
    pub fn root() -> Self {
        Self::directory(ROOT)
    }

    fn new(name: String, is_dir: bool) -> Self {
        Self {
            name,
            is_dir,
            content: Box::new([0; CONTENT_SIZE]),
            size: 0,
            next_sector: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_root(&self) -> bool {
        self.is_dir && self.name == ROOT
    }

    /// Stored size field. May exceed [`CONTENT_SIZE`] on a corrupted image.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn next_sector(&self) -> u32 {
        self.next_sector
    }

    pub fn set_next_sector(&mut self, sector: u32) {
        self.next_sector = sector;
    }

    /// Valid content bytes.
    pub fn data(&self) -> &[u8] {
        let len = (self.size as usize).min(CONTENT_SIZE);
        &self.content[..len]
    }

    /// Replace the content. Bytes past the new size are zeroed.
    pub fn set_data(&mut self, data: &[u8]) -> FsResult<()> {
        if data.len() > CONTENT_SIZE {
            return Err(FsError::FileTooLarge {
                size: data.len(),
                max: CONTENT_SIZE,
            });
        }
        self.content.fill(0);
        self.content[..data.len()].copy_from_slice(data);
        self.size = data.len() as u32;
        Ok(())
    }

    /// Same record under a different name, chain pointer cleared.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_sector: 0,
            ..self.clone()
        }
    }

    /// Encode into the padded on-disk image.
    pub fn encode(&self) -> FsResult<Vec<u8>> {
        let name = self.name.as_bytes();
        if name.len() > MAX_PATH_LEN {
            return Err(FsError::PathTooLong(self.name.clone()));
        }

        let mut buf = vec![0u8; SECTORS_PER_RECORD * SECTOR_SIZE];
        buf[..name.len()].copy_from_slice(name);
        buf[OFF_IS_DIR..OFF_CONTENT].copy_from_slice(&(self.is_dir as i32).to_le_bytes());
        buf[OFF_CONTENT..OFF_NEXT].copy_from_slice(&self.content[..]);
        buf[OFF_NEXT..OFF_SIZE].copy_from_slice(&self.next_sector.to_le_bytes());
        buf[OFF_SIZE..RECORD_BYTES].copy_from_slice(&self.size.to_le_bytes());
        Ok(buf)
    }

    /// Decode from at least [`RECORD_BYTES`] bytes.
    pub fn decode(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= RECORD_BYTES);

        let name_end = bytes[..NAME_FIELD]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_PATH_LEN);
        let name = String::from_utf8_lossy(&bytes[..name_end]).into_owned();

        let mut content = Box::new([0u8; CONTENT_SIZE]);
        content.copy_from_slice(&bytes[OFF_CONTENT..OFF_NEXT]);

        Self {
            name,
            is_dir: read_u32(bytes, OFF_IS_DIR) != 0,
            content,
            size: read_u32(bytes, OFF_SIZE),
            next_sector: read_u32(bytes, OFF_NEXT),
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("is_dir", &self.is_dir)
            .field("size", &self.size)
            .field("next_sector", &self.next_sector)
            .finish()
    }
}

/// Write `record` to the sector run starting at `lba`.
pub fn write_record<D: BlockDevice + ?Sized>(
    device: &mut D,
    lba: u32,
    record: &Record,
) -> FsResult<()> {
    let bytes = record.encode()?;
    for (i, chunk) in bytes.chunks_exact(SECTOR_SIZE).enumerate() {
        let mut sector = [0u8; SECTOR_SIZE];
        sector.copy_from_slice(chunk);
        device.write_sector(lba + i as u32, &sector)?;
    }
    Ok(())
}

/// Read the record stored in the sector run starting at `lba`.
pub fn read_record<D: BlockDevice + ?Sized>(device: &mut D, lba: u32) -> FsResult<Record> {
    let mut bytes = Vec::with_capacity(SECTORS_PER_RECORD * SECTOR_SIZE);
    for i in 0..SECTORS_PER_RECORD {
        bytes.extend_from_slice(&device.read_sector(lba + i as u32)?);
    }
    Ok(Record::decode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    #[test]
    fn test_layout_constants() {
        assert_eq!(RECORD_BYTES, 5132);
        assert_eq!(SECTORS_PER_RECORD, 11);
    }

    #[test]
    fn test_encode_offsets() {
        let mut rec = Record::directory("home");
        rec.set_next_sector(12);
        let bytes = rec.encode().unwrap();

        assert_eq!(bytes.len(), 11 * SECTOR_SIZE);
        assert_eq!(&bytes[..4], b"home");
        assert_eq!(bytes[4], 0);
        assert_eq!(&bytes[1024..1028], &1i32.to_le_bytes());
        assert_eq!(&bytes[5124..5128], &12u32.to_le_bytes());
        assert!(bytes[RECORD_BYTES..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_roundtrip_through_device() {
        let mut rec = Record::file("home/user/a.txt");
        rec.set_data(b"hi").unwrap();
        rec.set_next_sector(23);

        let mut disk = MemoryDisk::new();
        write_record(&mut disk, 1, &rec).unwrap();
        let back = read_record(&mut disk, 1).unwrap();

        assert_eq!(back.name(), "home/user/a.txt");
        assert!(!back.is_dir());
        assert_eq!(back.size(), 2);
        assert_eq!(back.data(), b"hi");
        assert_eq!(back.next_sector(), 23);
        assert_eq!(disk.written_sectors(), SECTORS_PER_RECORD);
    }

    #[test]
    fn test_full_content_roundtrip() {
        let mut rec = Record::file("big");
        let data: Vec<u8> = (0..CONTENT_SIZE).map(|i| (i % 256) as u8).collect();
        rec.set_data(&data).unwrap();

        let back = Record::decode(&rec.encode().unwrap());
        assert_eq!(back.data(), &data[..]);
    }

    #[test]
    fn test_set_data_too_large() {
        let mut rec = Record::file("f");
        let err = rec.set_data(&vec![0u8; CONTENT_SIZE + 1]).unwrap_err();
        assert!(matches!(err, FsError::FileTooLarge { .. }));
        assert_eq!(rec.size(), 0);
    }

    #[test]
    fn test_encode_name_too_long() {
        let rec = Record::file("x".repeat(NAME_FIELD));
        assert!(matches!(rec.encode(), Err(FsError::PathTooLong(_))));
    }

    #[test]
    fn test_oversized_size_field_clamps_data() {
        let mut bytes = Record::file("f").encode().unwrap();
        bytes[OFF_SIZE..RECORD_BYTES].copy_from_slice(&9000u32.to_le_bytes());
        let rec = Record::decode(&bytes);

        assert_eq!(rec.size(), 9000);
        assert_eq!(rec.data().len(), CONTENT_SIZE);
    }

    #[test]
    fn test_blank_sectors_decode_to_empty_name() {
        let mut disk = MemoryDisk::new();
        let rec = read_record(&mut disk, 1).unwrap();
        assert!(rec.name().is_empty());
        assert_eq!(rec.next_sector(), 0);
    }
}
