//! Block device abstractions for WexFS.
//!
//! - `BlockDevice`: sector read/write interface
//! - `AtaDisk`: PIO ATA driver over an `AtaBus` (with `EmulatedAtaBus`)
//! - `MemoryDisk`: in-memory implementation
//! - `FileDisk`: host disk image
//! - `OverlayDisk`: copy-on-write overlay

pub mod ata;
mod block_dev;
mod file_disk;
mod memory_disk;
mod overlay_disk;

pub use ata::{AtaBus, AtaDisk, EmulatedAtaBus};
pub use block_dev::{BlockDevice, Sector, MAX_LBA, SECTOR_SIZE};
pub use file_disk::FileDisk;
pub use memory_disk::MemoryDisk;
pub use overlay_disk::OverlayDisk;
