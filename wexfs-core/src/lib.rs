//! WexFS Core
//!
//! This crate provides the core components of the WexFS flat-table filesystem:
//! - Block devices (PIO ATA, memory, host image file, copy-on-write overlay)
//! - Record serialization and the in-memory filesystem table
//! - Integrity checking, config files and installer layouts
//! - A command shell over a console abstraction
//!
//! # Architecture
//!
//! The filesystem uses a layered design:
//! - `BlockDevice` trait: 512-byte sector I/O
//! - `Table`: every record of the volume plus the current directory
//! - `Volume`: a table bound to its device, saved after every mutation
//! - `SharedVolume`: `Arc<RwLock<Volume>>` handle for multiple callers
//! - `Shell`: parses command lines and drives a `ShellConsole`

pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod fsck;
pub mod layout;
pub mod record;
pub mod shared;
pub mod shell;
pub mod table;
pub mod volume;

pub use console::{HeadlessConsole, ShellConsole};
pub use device::{
    AtaBus, AtaDisk, BlockDevice, EmulatedAtaBus, FileDisk, MemoryDisk, OverlayDisk, SECTOR_SIZE,
};
pub use error::{FsError, FsResult};
pub use fsck::{Finding, IntegrityReport};
pub use layout::{InstallLayout, InstallSummary, LayoutFile};
pub use record::Record;
pub use shared::SharedVolume;
pub use shell::{Command, Shell, ShellControl};
pub use table::{DirEntry, EntrySize, RemovePolicy, Table, MAX_RECORDS, MIN_IMAGE_SECTORS};
pub use volume::Volume;
