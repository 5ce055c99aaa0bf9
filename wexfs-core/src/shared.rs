//! Shared volume handle for multiple callers.
//!
//! Wraps a [`Volume`] so that a shell task, an fsck run and a host tool can
//! work on the same mounted image. Records, dirty flag and current directory
//! are guarded together. Clone is cheap (just clones the Arc).

use std::sync::{Arc, RwLock};

use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::fsck::IntegrityReport;
use crate::table::{DirEntry, EntrySize};
use crate::volume::Volume;

/// Thread-safe handle to a mounted volume.
pub struct SharedVolume<D: BlockDevice> {
    inner: Arc<RwLock<Volume<D>>>,
}

impl<D: BlockDevice> Clone for SharedVolume<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: BlockDevice> SharedVolume<D> {
    pub fn new(volume: Volume<D>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(volume)),
        }
    }

    /// Load the table from `device` and share it.
    pub fn open(device: D) -> FsResult<Self> {
        Ok(Self::new(Volume::open(device)?))
    }

    /// Run `f` under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&Volume<D>) -> T) -> FsResult<T> {
        let guard = self.inner.read().map_err(|_| FsError::LockPoisoned)?;
        Ok(f(&guard))
    }

    /// Run `f` under the write lock.
    pub fn write<T>(&self, f: impl FnOnce(&mut Volume<D>) -> FsResult<T>) -> FsResult<T> {
        let mut guard = self.inner.write().map_err(|_| FsError::LockPoisoned)?;
        f(&mut guard)
    }

    /// Number of live handles.
    pub fn handles(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Take the volume back once every other handle is gone.
    pub fn try_unwrap(self) -> Result<Volume<D>, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(lock) => lock.into_inner().map_err(|poisoned| Self::new(poisoned.into_inner())),
            Err(inner) => Err(Self { inner }),
        }
    }

    pub fn cwd(&self) -> FsResult<String> {
        self.read(|v| v.cwd().to_string())
    }

    pub fn list(&self) -> FsResult<Vec<DirEntry>> {
        self.read(|v| v.list())
    }

    pub fn exists(&self, name: &str) -> FsResult<bool> {
        self.read(|v| v.exists(name))
    }

    pub fn read_file(&self, name: &str) -> FsResult<Vec<u8>> {
        self.read(|v| v.read_file(name))?
    }

    pub fn size(&self, name: &str) -> FsResult<EntrySize> {
        self.read(|v| v.size(name))?
    }

    pub fn check_integrity(&self) -> FsResult<IntegrityReport> {
        self.read(|v| v.check_integrity())
    }

    pub fn make_directory(&self, name: &str) -> FsResult<String> {
        self.write(|v| v.make_directory(name))
    }

    pub fn create_file(&self, name: &str) -> FsResult<String> {
        self.write(|v| v.create_file(name))
    }

    pub fn write_file(&self, name: &str, data: &[u8]) -> FsResult<()> {
        self.write(|v| v.write_file(name, data))
    }

    pub fn remove(&self, name: &str) -> FsResult<Vec<String>> {
        self.write(|v| v.remove(name))
    }

    pub fn copy(&self, src: &str, dest: &str) -> FsResult<String> {
        self.write(|v| v.copy(src, dest))
    }

    pub fn change_directory(&self, name: &str) -> FsResult<()> {
        self.write(|v| v.change_directory(name))
    }
}
