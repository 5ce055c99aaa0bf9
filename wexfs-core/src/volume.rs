//! A table bound to its block device.
//!
//! Every mutating call changes the table and saves it before returning, so
//! the on-disk image matches memory whenever a call completes successfully.

use log::debug;

use crate::device::BlockDevice;
use crate::error::FsResult;
use crate::fsck::IntegrityReport;
use crate::record::Record;
use crate::table::{DirEntry, EntrySize, RemovePolicy, Table};

/// Mounted WexFS volume.
pub struct Volume<D: BlockDevice> {
    device: D,
    table: Table,
    remove_policy: RemovePolicy,
}

impl<D: BlockDevice> Volume<D> {
    /// Load the table from `device` (creating the root on a blank device).
    pub fn open(mut device: D) -> FsResult<Self> {
        let table = Table::load(&mut device)?;
        Ok(Self {
            device,
            table,
            remove_policy: RemovePolicy::default(),
        })
    }

    /// Use a different policy for [`remove`](Self::remove).
    pub fn with_remove_policy(mut self, policy: RemovePolicy) -> Self {
        self.remove_policy = policy;
        self
    }

    pub fn remove_policy(&self) -> RemovePolicy {
        self.remove_policy
    }

    pub fn set_remove_policy(&mut self, policy: RemovePolicy) {
        self.remove_policy = policy;
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Unmount, returning the device.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Flush pending changes. A no-op when nothing changed.
    pub fn sync(&mut self) -> FsResult<()> {
        self.table.save(&mut self.device)
    }

    /// Run `f` against a copy of the table, then swap it in and save.
    /// If `f` fails the table is left exactly as it was.
    ///
    /// Use this to batch several mutations into one write-out.
    pub fn update<T>(&mut self, f: impl FnOnce(&mut Table) -> FsResult<T>) -> FsResult<T> {
        let mut staged = self.table.clone();
        let value = f(&mut staged)?;
        self.table = staged;
        self.sync()?;
        Ok(value)
    }

    /// Re-read the table from the device, discarding unsaved changes.
    pub fn reload(&mut self) -> FsResult<()> {
        let cwd = self.table.cwd().to_string();
        self.table = Table::load(&mut self.device)?;
        if self.table.change_directory(&format!("/{}", cwd)).is_err() {
            debug!("directory {} vanished on reload", cwd);
        }
        Ok(())
    }

    pub fn cwd(&self) -> &str {
        self.table.cwd()
    }

    pub fn resolve(&self, name: &str) -> FsResult<String> {
        self.table.resolve(name)
    }

    pub fn make_directory(&mut self, name: &str) -> FsResult<String> {
        self.update(|t| t.make_directory(name))
    }

    pub fn create_file(&mut self, name: &str) -> FsResult<String> {
        self.update(|t| t.create_file(name))
    }

    /// Remove using the volume's policy.
    pub fn remove(&mut self, name: &str) -> FsResult<Vec<String>> {
        let policy = self.remove_policy;
        self.update(|t| t.remove(name, policy))
    }

    pub fn remove_with(&mut self, name: &str, policy: RemovePolicy) -> FsResult<Vec<String>> {
        self.update(|t| t.remove(name, policy))
    }

    pub fn remove_entry_only(&mut self, name: &str) -> FsResult<Vec<String>> {
        self.update(|t| t.remove_entry_only(name))
    }

    pub fn remove_recursive(&mut self, name: &str) -> FsResult<Vec<String>> {
        self.update(|t| t.remove_recursive(name))
    }

    /// Changes only the current directory; nothing is written.
    pub fn change_directory(&mut self, name: &str) -> FsResult<()> {
        self.table.change_directory(name)
    }

    pub fn lookup(&self, name: &str) -> FsResult<&Record> {
        self.table.lookup(name)
    }

    pub fn find_file(&self, name: &str) -> FsResult<&Record> {
        self.table.find_file(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.table.exists(name)
    }

    pub fn list(&self) -> Vec<DirEntry> {
        self.table.list()
    }

    pub fn list_dir(&self, name: &str) -> FsResult<Vec<DirEntry>> {
        self.table.list_dir(name)
    }

    pub fn find(&self, pattern: &str) -> Vec<&Record> {
        self.table.find(pattern)
    }

    pub fn copy(&mut self, src: &str, dest: &str) -> FsResult<String> {
        self.update(|t| t.copy(src, dest))
    }

    pub fn size(&self, name: &str) -> FsResult<EntrySize> {
        self.table.size(name)
    }

    pub fn read_file(&self, name: &str) -> FsResult<Vec<u8>> {
        self.table.read_file(name)
    }

    pub fn write_file(&mut self, name: &str, data: &[u8]) -> FsResult<()> {
        self.update(|t| t.write_file(name, data))
    }

    /// Erase everything except the root.
    pub fn format(&mut self) -> FsResult<()> {
        self.update(|t| {
            t.format();
            Ok(())
        })
    }

    pub fn check_integrity(&self) -> IntegrityReport {
        self.table.check_integrity()
    }
}
