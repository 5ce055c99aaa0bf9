//! System configuration files kept on the volume.
//!
//! - `SystemRoot/config/autorun.cfg`: shell command run at boot
//! - `SystemRoot/config/pass.cfg`: login password
//!
//! Both are ordinary files. An empty or missing file disables the feature.

use log::debug;

use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::table::Table;
use crate::volume::Volume;

/// Directory holding the config files.
pub const CONFIG_DIR: &str = "/SystemRoot/config";

pub const AUTORUN_PATH: &str = "/SystemRoot/config/autorun.cfg";

pub const PASSWORD_PATH: &str = "/SystemRoot/config/pass.cfg";

/// Autorun commands must be shorter than this.
pub const AUTORUN_MAX_COMMAND: usize = 128;

/// Command stored in the autorun file, if any.
pub fn autorun_command<D: BlockDevice>(volume: &Volume<D>) -> Option<String> {
    let data = volume.read_file(AUTORUN_PATH).ok()?;
    let text = String::from_utf8_lossy(&data);
    let line = text.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Store `command` as the boot command, creating the config tree when missing.
pub fn enable_autorun<D: BlockDevice>(volume: &mut Volume<D>, command: &str) -> FsResult<()> {
    let command = command.trim();
    if command.len() >= AUTORUN_MAX_COMMAND {
        return Err(FsError::AutorunTooLong);
    }
    if command.is_empty() {
        return Err(FsError::InvalidName(command.to_string()));
    }

    volume.update(|t| {
        ensure_file(t, AUTORUN_PATH)?;
        t.write_file(AUTORUN_PATH, command.as_bytes())
    })?;
    debug!("autorun set to '{}'", command);
    Ok(())
}

/// Clear the autorun file. A missing file is left missing.
pub fn disable_autorun<D: BlockDevice>(volume: &mut Volume<D>) -> FsResult<()> {
    if !volume.exists(AUTORUN_PATH) {
        return Ok(());
    }
    volume.write_file(AUTORUN_PATH, b"")?;
    debug!("autorun cleared");
    Ok(())
}

/// Stored password bytes. `None` when no password is set.
pub fn password<D: BlockDevice>(volume: &Volume<D>) -> Option<Vec<u8>> {
    volume
        .read_file(PASSWORD_PATH)
        .ok()
        .filter(|data| !data.is_empty())
}

/// True when `typed` matches the stored password, or when none is set.
pub fn check_password<D: BlockDevice>(volume: &Volume<D>, typed: &str) -> bool {
    match password(volume) {
        Some(stored) => stored == typed.as_bytes(),
        None => true,
    }
}

/// Set the login password. An empty password removes the protection.
pub fn set_password<D: BlockDevice>(volume: &mut Volume<D>, password: &str) -> FsResult<()> {
    volume.update(|t| {
        ensure_file(t, PASSWORD_PATH)?;
        t.write_file(PASSWORD_PATH, password.as_bytes())
    })
}

/// Create every missing ancestor directory of `path`, then the file itself.
pub(crate) fn ensure_file(table: &mut Table, path: &str) -> FsResult<()> {
    let rel = path.trim_start_matches('/');
    let mut dir = String::new();
    let mut segments = rel.split('/').peekable();
    while let Some(segment) = segments.next() {
        if !dir.is_empty() {
            dir.push('/');
        }
        dir.push_str(segment);
        let abs = format!("/{}", dir);
        if table.exists(&abs) {
            continue;
        }
        if segments.peek().is_some() {
            table.make_directory(&abs)?;
        } else {
            table.create_file(&abs)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDisk;

    fn volume() -> Volume<MemoryDisk> {
        Volume::open(MemoryDisk::new()).unwrap()
    }

    #[test]
    fn test_autorun_disabled_by_default() {
        assert_eq!(autorun_command(&volume()), None);
    }

    #[test]
    fn test_enable_autorun_creates_tree() {
        let mut vol = volume();
        enable_autorun(&mut vol, "  ls ").unwrap();

        assert!(vol.lookup("/SystemRoot").unwrap().is_dir());
        assert!(vol.lookup("/SystemRoot/config").unwrap().is_dir());
        assert_eq!(autorun_command(&vol).as_deref(), Some("ls"));

        // Stays put when run again
        let count = vol.table().len();
        enable_autorun(&mut vol, "pwd").unwrap();
        assert_eq!(vol.table().len(), count);
        assert_eq!(autorun_command(&vol).as_deref(), Some("pwd"));
    }

    #[test]
    fn test_autorun_uses_first_line() {
        let mut vol = volume();
        enable_autorun(&mut vol, "ls").unwrap();
        vol.write_file(AUTORUN_PATH, b"cd home\nls\n").unwrap();
        assert_eq!(autorun_command(&vol).as_deref(), Some("cd home"));
    }

    #[test]
    fn test_disable_autorun_persists() {
        let mut vol = volume();
        enable_autorun(&mut vol, "ls").unwrap();
        disable_autorun(&mut vol).unwrap();

        let vol = Volume::open(vol.into_device()).unwrap();
        assert_eq!(autorun_command(&vol), None);
        assert_eq!(vol.size(AUTORUN_PATH).unwrap().bytes(), 0);
    }

    #[test]
    fn test_autorun_length_limit() {
        let mut vol = volume();
        let long = "x".repeat(AUTORUN_MAX_COMMAND);
        assert!(matches!(
            enable_autorun(&mut vol, &long),
            Err(FsError::AutorunTooLong)
        ));
        assert!(!vol.exists(CONFIG_DIR));
        enable_autorun(&mut vol, &long[1..]).unwrap();
    }

    #[test]
    fn test_password() {
        let mut vol = volume();
        assert!(password(&vol).is_none());
        assert!(check_password(&vol, "anything"));

        set_password(&mut vol, "hunter2").unwrap();
        assert!(check_password(&vol, "hunter2"));
        assert!(!check_password(&vol, "hunter"));

        set_password(&mut vol, "").unwrap();
        assert!(check_password(&vol, "whatever"));
    }

    #[test]
    fn test_autorun_on_nearly_full_table_changes_nothing() {
        let mut vol = volume();
        vol.update(|t| {
            for i in 0..crate::table::MAX_RECORDS - 3 {
                t.create_file(&format!("f{}", i))?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(vol.table().free_slots(), 2);

        // Two slots fit the directories but not autorun.cfg
        assert!(matches!(
            enable_autorun(&mut vol, "ls"),
            Err(FsError::TableFull)
        ));
        assert!(matches!(
            set_password(&mut vol, "pw"),
            Err(FsError::TableFull)
        ));
        assert_eq!(vol.table().free_slots(), 2);
        assert!(!vol.exists("/SystemRoot"));
        assert!(!vol.table().is_dirty());

        // A later mutation must not flush the abandoned directories
        vol.create_file("g").unwrap();
        let vol = Volume::open(vol.into_device()).unwrap();
        assert!(!vol.exists("/SystemRoot"));
        assert_eq!(vol.table().free_slots(), 1);
    }

    #[test]
    fn test_config_works_from_subdirectory() {
        let mut vol = volume();
        vol.make_directory("home").unwrap();
        vol.change_directory("home").unwrap();

        enable_autorun(&mut vol, "ls").unwrap();
        assert!(vol.exists("/SystemRoot/config/autorun.cfg"));
        assert!(!vol.exists("/home/SystemRoot"));
    }
}
