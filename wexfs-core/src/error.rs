//! Error types for WexFS.

use thiserror::Error;

/// Errors that can occur during filesystem operations.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Name too long: {0}")]
    NameTooLong(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),

    #[error("Maximum files reached")]
    TableFull,

    #[error("Name already exists: {0}")]
    AlreadyExists(String),

    #[error("File or directory not found: {0}")]
    NotFound(String),

    #[error("'{0}' is a directory")]
    IsADirectory(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Cannot remove the root directory")]
    CannotRemoveRoot,

    #[error("Invalid name: '{0}'")]
    InvalidName(String),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Autorun command too long")]
    AutorunTooLong,

    #[error("ATA read error at LBA {lba}")]
    DeviceRead { lba: u32 },

    #[error("ATA write error at LBA {lba}")]
    DeviceWrite { lba: u32 },

    #[error("LBA out of range: {0}")]
    LbaOutOfRange(u32),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FsError {
    /// True for failures reported by the block device.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            FsError::DeviceRead { .. } | FsError::DeviceWrite { .. } | FsError::LbaOutOfRange(_)
        )
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
