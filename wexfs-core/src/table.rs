//! The filesystem table: every record of the volume, held in memory.
//!
//! There is no directory tree. A record belongs to directory `D` when its
//! name is `D/<segment>`; records directly under the root carry no leading
//! separator (`"home"`, `"home/user"`). The current directory is either `"/"`
//! or a path with a trailing separator (`"home/user/"`).

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};

use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::record::{read_record, write_record, Record, NAME_FIELD, ROOT, SECTORS_PER_RECORD};

/// Maximum number of records, root included.
pub const MAX_RECORDS: usize = 64;

/// First sector of the record area. Sector 0 is reserved.
pub const FIRST_DATA_SECTOR: u32 = 1;

/// Names of entries directly under the root must be shorter than this.
pub const MAX_ROOT_NAME: usize = 256;

/// Sectors needed to hold a full table.
pub const MIN_IMAGE_SECTORS: u32 =
    FIRST_DATA_SECTOR + (MAX_RECORDS * SECTORS_PER_RECORD) as u32;

/// Start sector of record `index`.
pub fn record_lba(index: usize) -> u32 {
    FIRST_DATA_SECTOR + (index * SECTORS_PER_RECORD) as u32
}

/// What `remove` does with the contents of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovePolicy {
    /// Delete only the named record; children stay behind as orphans.
    EntryOnly,
    /// Delete the record and everything below it.
    #[default]
    Recursive,
    /// Refuse to delete a directory that still has descendants.
    RejectNonEmpty,
}

impl FromStr for RemovePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entry-only" => Ok(Self::EntryOnly),
            "recursive" => Ok(Self::Recursive),
            "reject-non-empty" => Ok(Self::RejectNonEmpty),
            other => Err(format!(
                "unknown remove policy '{}' (expected recursive, entry-only or reject-non-empty)",
                other
            )),
        }
    }
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name relative to the listed directory.
    pub name: String,
    pub is_dir: bool,
    pub size: u32,
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "{}/", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Result of a size query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySize {
    File(u32),
    /// Sum over every file below the directory.
    Directory(u64),
}

impl EntrySize {
    pub fn bytes(self) -> u64 {
        match self {
            EntrySize::File(n) => n as u64,
            EntrySize::Directory(n) => n,
        }
    }
}

/// In-memory record table with its current directory and dirty flag.
#[derive(Debug, Clone)]
pub struct Table {
    records: Vec<Record>,
    cwd: String,
    dirty: bool,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    /// Fresh table holding only the root. It is dirty until first saved.
    pub fn new() -> Self {
        Self {
            records: vec![Record::root()],
            cwd: ROOT.to_string(),
            dirty: true,
        }
    }

    /// Load the table from `device`, following chain pointers from sector 1.
    ///
    /// A blank device yields a table with only the root, which is written
    /// back immediately.
    pub fn load<D: BlockDevice + ?Sized>(device: &mut D) -> FsResult<Self> {
        let mut records = Vec::new();
        let mut sector = FIRST_DATA_SECTOR;

        while sector != 0 && records.len() < MAX_RECORDS {
            let record = read_record(device, sector)?;
            if record.name().is_empty() {
                break;
            }
            sector = record.next_sector();
            records.push(record);
        }

        let mut table = Self {
            records,
            cwd: ROOT.to_string(),
            dirty: false,
        };

        match table.records.iter().position(Record::is_root) {
            Some(0) => {}
            Some(pos) => {
                warn!("root record found at slot {}, moving to front", pos);
                let root = table.records.remove(pos);
                table.records.insert(0, root);
                table.dirty = true;
            }
            None => {
                if !table.records.is_empty() {
                    warn!("root record missing, recreating");
                }
                table.records.insert(0, Record::root());
                if table.records.len() > MAX_RECORDS {
                    let dropped = table.records.pop();
                    warn!("table over capacity, dropped {:?}", dropped);
                }
                table.dirty = true;
            }
        }

        debug!("loaded {} records", table.records.len());
        table.save(device)?;
        Ok(table)
    }

    /// Write every record back to `device` if anything changed.
    ///
    /// Records are laid out back to back from sector 1. Each record's chain
    /// pointer is set to the next record's start (0 for the last) before it is
    /// written. On a device error the table stays dirty.
    pub fn save<D: BlockDevice + ?Sized>(&mut self, device: &mut D) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let count = self.records.len();
        for i in 0..count {
            let next = if i + 1 < count { record_lba(i + 1) } else { 0 };
            self.records[i].set_next_sector(next);
            write_record(device, record_lba(i), &self.records[i])?;
        }

        self.dirty = false;
        debug!("saved {} records", count);
        Ok(())
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false: the root record is never removed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn free_slots(&self) -> usize {
        MAX_RECORDS.saturating_sub(self.records.len())
    }

    /// Current directory (`"/"` or a path ending in `/`).
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Build the stored path for `name` relative to the current directory.
    ///
    /// A leading `/` resolves from the root. Trailing separators are ignored.
    pub fn resolve(&self, name: &str) -> FsResult<String> {
        if name.is_empty() {
            return Err(FsError::InvalidName(name.to_string()));
        }
        if name == ROOT {
            return Ok(ROOT.to_string());
        }

        let (base, rel) = match name.strip_prefix('/') {
            Some(abs) => (ROOT, abs),
            None => (self.cwd.as_str(), name),
        };
        let rel = rel.trim_end_matches('/');
        if rel.is_empty() {
            return Ok(ROOT.to_string());
        }
        if rel.contains('\0')
            || rel
                .split('/')
                .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(FsError::InvalidName(name.to_string()));
        }

        if base == ROOT {
            // The short limit covers entries directly under the root only
            if !rel.contains('/') && rel.len() >= MAX_ROOT_NAME {
                return Err(FsError::NameTooLong(name.to_string()));
            }
            if rel.len() + 1 >= NAME_FIELD {
                return Err(FsError::PathTooLong(name.to_string()));
            }
            Ok(rel.to_string())
        } else {
            if base.len() + rel.len() + 1 >= NAME_FIELD {
                return Err(FsError::PathTooLong(name.to_string()));
            }
            Ok(format!("{}{}", base, rel))
        }
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.records.iter().position(|r| r.name() == path)
    }

    fn add(&mut self, name: &str, is_dir: bool) -> FsResult<String> {
        let path = self.resolve(name)?;
        if self.records.len() >= MAX_RECORDS {
            return Err(FsError::TableFull);
        }
        if self.position(&path).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let record = if is_dir {
            Record::directory(path.clone())
        } else {
            Record::file(path.clone())
        };
        self.records.push(record);
        self.dirty = true;
        debug!("created {} '{}'", if is_dir { "directory" } else { "file" }, path);
        Ok(path)
    }

    /// Append an empty directory record. Returns the stored path.
    pub fn make_directory(&mut self, name: &str) -> FsResult<String> {
        self.add(name, true)
    }

    /// Append an empty file record. Returns the stored path.
    pub fn create_file(&mut self, name: &str) -> FsResult<String> {
        self.add(name, false)
    }

    /// Remove `name` according to `policy`. Returns the removed paths, the
    /// named record first.
    ///
    /// Remaining records keep their relative order. If the current directory
    /// was inside a removed directory it falls back to the root.
    pub fn remove(&mut self, name: &str, policy: RemovePolicy) -> FsResult<Vec<String>> {
        let path = self.resolve(name)?;
        if path == ROOT {
            return Err(FsError::CannotRemoveRoot);
        }
        let idx = self
            .position(&path)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let prefix = format!("{}/", path);
        let is_dir = self.records[idx].is_dir();
        if policy == RemovePolicy::RejectNonEmpty
            && is_dir
            && self.records.iter().any(|r| r.name().starts_with(&prefix))
        {
            return Err(FsError::DirectoryNotEmpty(name.to_string()));
        }

        let mut removed = vec![self.records.remove(idx).name().to_string()];
        if policy == RemovePolicy::Recursive && is_dir {
            self.records.retain(|r| {
                let below = r.name().starts_with(&prefix);
                if below {
                    removed.push(r.name().to_string());
                }
                !below
            });
        }

        if self.cwd.starts_with(&prefix) {
            self.cwd = ROOT.to_string();
        }
        self.dirty = true;
        debug!("removed {:?} ({:?})", removed, policy);
        Ok(removed)
    }

    /// Remove only the named record, even a non-empty directory.
    pub fn remove_entry_only(&mut self, name: &str) -> FsResult<Vec<String>> {
        self.remove(name, RemovePolicy::EntryOnly)
    }

    /// Remove the named record and, for a directory, all of its descendants.
    pub fn remove_recursive(&mut self, name: &str) -> FsResult<Vec<String>> {
        self.remove(name, RemovePolicy::Recursive)
    }

    /// Change the current directory. `..` goes up one level, `/` to the root.
    pub fn change_directory(&mut self, name: &str) -> FsResult<()> {
        match name {
            ".." => {
                let trimmed = self.cwd.trim_end_matches('/');
                self.cwd = match trimmed.rfind('/') {
                    Some(i) => trimmed[..=i].to_string(),
                    None => ROOT.to_string(),
                };
            }
            ROOT => self.cwd = ROOT.to_string(),
            _ => {
                let path = self.resolve(name)?;
                if path == ROOT {
                    self.cwd = path;
                    return Ok(());
                }
                let record = self
                    .record(&path)
                    .ok_or_else(|| FsError::NotFound(name.to_string()))?;
                if !record.is_dir() {
                    return Err(FsError::NotADirectory(name.to_string()));
                }
                self.cwd = format!("{}/", path);
            }
        }
        Ok(())
    }

    /// Record stored under exactly `path` (no resolution).
    pub fn record(&self, path: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name() == path)
    }

    /// Look up a file or directory.
    pub fn lookup(&self, name: &str) -> FsResult<&Record> {
        let path = self.resolve(name)?;
        self.record(&path)
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    /// Look up a file. Directories are rejected.
    pub fn find_file(&self, name: &str) -> FsResult<&Record> {
        let record = self.lookup(name)?;
        if record.is_dir() {
            return Err(FsError::IsADirectory(name.to_string()));
        }
        Ok(record)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.lookup(name).is_ok()
    }

    /// Direct children of the current directory, in table order.
    pub fn list(&self) -> Vec<DirEntry> {
        self.children(&self.cwd)
    }

    /// Direct children of the directory `name`.
    pub fn list_dir(&self, name: &str) -> FsResult<Vec<DirEntry>> {
        let record = self.lookup(name)?;
        if !record.is_dir() {
            return Err(FsError::NotADirectory(name.to_string()));
        }
        let dir = if record.is_root() {
            ROOT.to_string()
        } else {
            format!("{}/", record.name())
        };
        Ok(self.children(&dir))
    }

    fn children(&self, dir: &str) -> Vec<DirEntry> {
        self.records
            .iter()
            .filter_map(|r| {
                child_name(dir, r.name()).map(|name| DirEntry {
                    name: name.to_string(),
                    is_dir: r.is_dir(),
                    size: r.size(),
                })
            })
            .collect()
    }

    /// Every record whose full name contains `pattern`.
    pub fn find(&self, pattern: &str) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.name().contains(pattern))
            .collect()
    }

    /// Duplicate the file `src` as a new file `dest`. Returns the new path.
    pub fn copy(&mut self, src: &str, dest: &str) -> FsResult<String> {
        let src_path = self.resolve(src)?;
        let idx = self
            .position(&src_path)
            .filter(|&i| !self.records[i].is_dir())
            .ok_or_else(|| FsError::NotFound(src.to_string()))?;

        if self.records.len() >= MAX_RECORDS {
            return Err(FsError::TableFull);
        }

        let dest_path = self.resolve(dest)?;
        if self.position(&dest_path).is_some() {
            return Err(FsError::AlreadyExists(dest.to_string()));
        }

        let copy = self.records[idx].renamed(dest_path.clone());
        self.records.push(copy);
        self.dirty = true;
        debug!("copied '{}' to '{}'", src_path, dest_path);
        Ok(dest_path)
    }

    /// Size of a file, or the total size of every file below a directory.
    pub fn size(&self, name: &str) -> FsResult<EntrySize> {
        let record = self.lookup(name)?;
        if record.is_dir() {
            Ok(EntrySize::Directory(self.directory_size(record.name())))
        } else {
            Ok(EntrySize::File(record.size()))
        }
    }

    fn directory_size(&self, path: &str) -> u64 {
        let prefix = format!("{}/", path);
        self.records
            .iter()
            .filter(|r| !r.is_dir() && (path == ROOT || r.name().starts_with(&prefix)))
            .map(|r| r.size() as u64)
            .sum()
    }

    /// Valid content of the file `name`.
    pub fn read_file(&self, name: &str) -> FsResult<Vec<u8>> {
        Ok(self.find_file(name)?.data().to_vec())
    }

    /// Replace the content of the file `name`.
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> FsResult<()> {
        let path = self.resolve(name)?;
        let idx = self
            .position(&path)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        if self.records[idx].is_dir() {
            return Err(FsError::IsADirectory(name.to_string()));
        }
        self.records[idx].set_data(data)?;
        self.dirty = true;
        debug!("wrote {} bytes to '{}'", data.len(), path);
        Ok(())
    }

    /// Reset to an empty filesystem containing only the root.
    pub fn format(&mut self) {
        self.records = vec![Record::root()];
        self.cwd = ROOT.to_string();
        self.dirty = true;
        debug!("formatted");
    }
}

/// Name of `name` relative to `dir` if it is a direct child.
/// `dir` is `"/"` or ends with a separator.
fn child_name<'a>(dir: &str, name: &'a str) -> Option<&'a str> {
    if dir == ROOT {
        if name.is_empty() || name == ROOT || name.contains('/') {
            None
        } else {
            Some(name)
        }
    } else {
        name.strip_prefix(dir)
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
    }
}
