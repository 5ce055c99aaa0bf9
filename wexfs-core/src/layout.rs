//! Installer layouts.
//!
//! A layout is a JSON manifest listing the directories and files a fresh
//! system volume starts with:
//!
//! ```json
//! {
//!   "name": "WexOS",
//!   "directories": ["home", "home/user"],
//!   "files": [{ "path": "home/user/readme", "content": "hello" }],
//!   "autorun": "ls"
//! }
//! ```
//!
//! Paths are relative to the root. Directories are created in order, so a
//! parent must come before its children.

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{ensure_file, AUTORUN_MAX_COMMAND, AUTORUN_PATH, PASSWORD_PATH};
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::table::Table;
use crate::volume::Volume;

const SYSTEM_LAYOUT: &str = include_str!("../assets/system_layout.json");

/// File entry in a layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutFile {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Install layout schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallLayout {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub files: Vec<LayoutFile>,
    /// Boot command written to the autorun file.
    #[serde(default)]
    pub autorun: Option<String>,
}

/// What an install created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstallSummary {
    pub directories: usize,
    pub files: usize,
}

impl InstallLayout {
    /// The standard WexOS tree.
    pub fn system() -> FsResult<Self> {
        Self::from_json(SYSTEM_LAYOUT)
    }

    pub fn from_json(text: &str) -> FsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> FsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Records the layout adds on top of the root, config files included.
    pub fn record_count(&self, with_password: bool) -> usize {
        self.directories.len()
            + self.files.len()
            + self.autorun.is_some() as usize
            + with_password as usize
    }

    fn apply(&self, table: &mut Table, password: Option<&str>) -> FsResult<InstallSummary> {
        let mut summary = InstallSummary {
            directories: 0,
            files: 0,
        };

        for dir in &self.directories {
            table.make_directory(&format!("/{}", dir))?;
            summary.directories += 1;
        }

        for file in &self.files {
            let path = format!("/{}", file.path);
            table.create_file(&path)?;
            if let Some(content) = &file.content {
                table.write_file(&path, content.as_bytes())?;
            }
            summary.files += 1;
        }

        if let Some(command) = &self.autorun {
            if command.len() >= AUTORUN_MAX_COMMAND {
                return Err(FsError::AutorunTooLong);
            }
            let before = table.len();
            ensure_file(table, AUTORUN_PATH)?;
            summary.files += table.len() - before;
            table.write_file(AUTORUN_PATH, command.as_bytes())?;
        }

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            let before = table.len();
            ensure_file(table, PASSWORD_PATH)?;
            summary.files += table.len() - before;
            table.write_file(PASSWORD_PATH, password.as_bytes())?;
        }

        Ok(summary)
    }
}

impl<D: BlockDevice> Volume<D> {
    /// Format the volume and lay down `layout`, optionally with a password.
    ///
    /// The tree is built in memory and written out once. If the layout does
    /// not fit, the call fails and the device is left untouched.
    pub fn install(
        &mut self,
        layout: &InstallLayout,
        password: Option<&str>,
    ) -> FsResult<InstallSummary> {
        let summary = self.update(|table| {
            *table = Table::new();
            layout.apply(table, password)
        })?;
        debug!(
            "installed {} directories, {} files",
            summary.directories, summary.files
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{autorun_command, check_password};
    use crate::device::{MemoryDisk, OverlayDisk};
    use crate::table::MAX_RECORDS;

    #[test]
    fn test_system_layout_parses() {
        let layout = InstallLayout::system().unwrap();
        assert_eq!(layout.name.as_deref(), Some("WexOS"));
        assert_eq!(layout.directories.len(), 30);
        assert_eq!(layout.files.len(), 19);
        assert_eq!(layout.autorun.as_deref(), Some("desktop"));
        assert!(layout.record_count(true) < MAX_RECORDS);
    }

    #[test]
    fn test_install_system_layout() {
        let mut vol = Volume::open(MemoryDisk::new()).unwrap();
        vol.create_file("leftover").unwrap();

        let layout = InstallLayout::system().unwrap();
        let summary = vol.install(&layout, Some("secret")).unwrap();
        assert_eq!(summary.directories, 30);
        assert_eq!(summary.files, 21);

        let vol = Volume::open(vol.into_device()).unwrap();
        assert!(!vol.exists("leftover"));
        assert!(vol.lookup("/home/user/desktop/RecycleBin").unwrap().is_dir());
        assert!(vol.lookup("/mnt/Z:").unwrap().is_dir());
        assert!(vol.find_file("/boot/Legacy/MBR.BIN").is_ok());
        assert_eq!(autorun_command(&vol).as_deref(), Some("desktop"));
        assert!(check_password(&vol, "secret"));
        assert_eq!(vol.table().len(), 1 + layout.record_count(true));
    }

    #[test]
    fn test_install_without_password() {
        let mut vol = Volume::open(MemoryDisk::new()).unwrap();
        vol.install(&InstallLayout::system().unwrap(), None).unwrap();
        assert!(!vol.exists(PASSWORD_PATH));
        assert!(check_password(&vol, ""));
    }

    #[test]
    fn test_custom_layout_with_content() {
        let layout = InstallLayout::from_json(
            r#"{
                "directories": ["docs"],
                "files": [{ "path": "docs/readme", "content": "hello" }]
            }"#,
        )
        .unwrap();

        let mut vol = Volume::open(MemoryDisk::new()).unwrap();
        let summary = vol.install(&layout, None).unwrap();
        assert_eq!(
            summary,
            InstallSummary {
                directories: 1,
                files: 1
            }
        );
        assert_eq!(vol.read_file("docs/readme").unwrap(), b"hello");
        assert_eq!(autorun_command(&vol), None);
    }

    #[test]
    fn test_oversized_layout_leaves_device_untouched() {
        let layout = InstallLayout {
            name: None,
            directories: (0..MAX_RECORDS).map(|i| format!("d{}", i)).collect(),
            files: Vec::new(),
            autorun: None,
        };

        let mut vol = Volume::open(OverlayDisk::new(MemoryDisk::new())).unwrap();
        vol.create_file("keep").unwrap();
        vol.device_mut().clear_overlay();

        assert!(matches!(vol.install(&layout, None), Err(FsError::TableFull)));
        assert!(vol.device().modified_sectors().is_empty());
        assert!(vol.exists("keep"));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            InstallLayout::from_json("{ not json"),
            Err(FsError::Json(_))
        ));
    }
}
