//! Read-only integrity check of a table.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::record::CONTENT_SIZE;
use crate::table::{Table, MAX_RECORDS};

/// Usage ratio (percent) from which the table is reported as nearly full.
pub const NEAR_CAPACITY_PERCENT: usize = 90;

/// A problem found by [`Table::check_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Finding {
    /// Two or more records share a name.
    DuplicateName { name: String, count: usize },
    /// A file claims more bytes than its content buffer holds.
    OversizedFile { name: String, size: u32, max: usize },
    /// A non-root record has an empty name.
    EmptyName { slot: usize },
    /// No root directory record.
    MissingRoot,
    /// Every slot is in use.
    AtCapacity { records: usize },
    /// Usage is at or above [`NEAR_CAPACITY_PERCENT`].
    NearCapacity { records: usize },
}

impl Finding {
    /// Warnings do not make the filesystem corrupted.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Finding::AtCapacity { .. } | Finding::NearCapacity { .. }
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::DuplicateName { name, count } => {
                write!(f, "ERROR: Duplicate filename: {} ({} copies)", name, count)
            }
            Finding::OversizedFile { name, size, max } => write!(
                f,
                "ERROR: File size exceeds content buffer: {} (size {}, max {})",
                name, size, max
            ),
            Finding::EmptyName { slot } => write!(f, "ERROR: Empty name in slot {}", slot),
            Finding::MissingRoot => f.write_str("ERROR: Root directory missing"),
            Finding::AtCapacity { records } => write!(
                f,
                "WARNING: Filesystem at maximum capacity ({} files)",
                records
            ),
            Finding::NearCapacity { records } => write!(
                f,
                "WARNING: Filesystem nearly full ({} of {} slots)",
                records, MAX_RECORDS
            ),
        }
    }
}

/// Outcome of an integrity check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub findings: Vec<Finding>,
    pub files: usize,
    pub directories: usize,
    pub total: usize,
    pub free_slots: usize,
}

impl IntegrityReport {
    pub fn errors(&self) -> usize {
        self.findings.iter().filter(|f| !f.is_warning()).count()
    }

    pub fn warnings(&self) -> usize {
        self.findings.iter().filter(|f| f.is_warning()).count()
    }

    pub fn is_ok(&self) -> bool {
        self.errors() == 0
    }

    /// `OK` or `CORRUPTED`.
    pub fn verdict(&self) -> &'static str {
        if self.is_ok() {
            "OK"
        } else {
            "CORRUPTED"
        }
    }

    /// Human-readable report, one line per entry.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.findings.iter().map(|f| f.to_string()).collect();
        lines.push(format!("Files: {}", self.files));
        lines.push(format!("Directories: {}", self.directories));
        lines.push(format!("Total objects: {}", self.total));
        lines.push(format!("Free slots: {}", self.free_slots));
        if self.errors() > 0 {
            lines.push(format!("Errors found: {}", self.errors()));
            lines.push("Run 'format' to fix filesystem errors.".to_string());
        } else {
            lines.push("No errors found.".to_string());
        }
        if self.warnings() > 0 {
            lines.push(format!("Warnings: {}", self.warnings()));
        }
        lines.push(format!("Filesystem is {}.", self.verdict()));
        lines
    }
}

impl Table {
    /// Scan the table for inconsistencies. Nothing is repaired.
    pub fn check_integrity(&self) -> IntegrityReport {
        let records = self.records();
        let mut findings = Vec::new();

        let mut seen = HashSet::new();
        for record in records {
            let name = record.name();
            if name.is_empty() || !seen.insert(name) {
                continue;
            }
            let count = records.iter().filter(|r| r.name() == name).count();
            if count > 1 {
                findings.push(Finding::DuplicateName {
                    name: name.to_string(),
                    count,
                });
            }
        }

        for (slot, record) in records.iter().enumerate() {
            if record.name().is_empty() {
                findings.push(Finding::EmptyName { slot });
            }
            if !record.is_dir() && record.size() as usize > CONTENT_SIZE {
                findings.push(Finding::OversizedFile {
                    name: record.name().to_string(),
                    size: record.size(),
                    max: CONTENT_SIZE,
                });
            }
        }

        if !records.iter().any(|r| r.is_root()) {
            findings.push(Finding::MissingRoot);
        }

        let total = records.len();
        if total >= MAX_RECORDS {
            findings.push(Finding::AtCapacity { records: total });
        } else if total * 100 >= MAX_RECORDS * NEAR_CAPACITY_PERCENT {
            findings.push(Finding::NearCapacity { records: total });
        }

        let directories = records.iter().filter(|r| r.is_dir()).count();
        IntegrityReport {
            findings,
            files: total - directories,
            directories,
            total,
            free_slots: self.free_slots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BlockDevice, MemoryDisk};
    use crate::record::{write_record, Record};
    use crate::table::record_lba;

    #[test]
    fn test_clean_table_is_ok() {
        let mut table = Table::new();
        table.make_directory("d").unwrap();
        table.create_file("d/f").unwrap();

        let report = table.check_integrity();
        assert!(report.is_ok());
        assert_eq!(report.verdict(), "OK");
        assert_eq!(report.files, 1);
        assert_eq!(report.directories, 2);
        assert_eq!(report.total, 3);
        assert_eq!(report.free_slots, MAX_RECORDS - 3);
    }

    #[test]
    fn test_detects_duplicates_and_oversize_on_disk() {
        // Build a corrupted image by hand
        let mut disk = MemoryDisk::new();
        let mut root = Record::root();
        root.set_next_sector(record_lba(1));
        let mut a = Record::file("a");
        a.set_next_sector(record_lba(2));
        let b = Record::file("a");
        write_record(&mut disk, record_lba(0), &root).unwrap();
        write_record(&mut disk, record_lba(1), &a).unwrap();
        write_record(&mut disk, record_lba(2), &b).unwrap();

        // Patch the size field of the last record
        let mut sector = disk.read_sector(record_lba(2) + 10).unwrap();
        let offset = crate::record::RECORD_BYTES - 4 - 10 * crate::device::SECTOR_SIZE;
        sector[offset..offset + 4].copy_from_slice(&5000u32.to_le_bytes());
        disk.write_sector(record_lba(2) + 10, &sector).unwrap();

        let table = Table::load(&mut disk).unwrap();
        let report = table.check_integrity();

        assert!(!report.is_ok());
        assert_eq!(report.verdict(), "CORRUPTED");
        assert!(report.findings.contains(&Finding::DuplicateName {
            name: "a".to_string(),
            count: 2
        }));
        assert!(report.findings.contains(&Finding::OversizedFile {
            name: "a".to_string(),
            size: 5000,
            max: CONTENT_SIZE
        }));
        assert_eq!(report.errors(), 2);
    }

    #[test]
    fn test_capacity_warnings() {
        let mut table = Table::new();
        for i in 1..58 {
            table.create_file(&format!("f{}", i)).unwrap();
        }
        let report = table.check_integrity();
        assert!(report.is_ok());
        assert!(matches!(
            report.findings.as_slice(),
            [Finding::NearCapacity { records: 58 }]
        ));

        for i in 58..MAX_RECORDS {
            table.create_file(&format!("f{}", i)).unwrap();
        }
        let report = table.check_integrity();
        assert!(report.is_ok());
        assert_eq!(report.warnings(), 1);
        assert!(report
            .lines()
            .iter()
            .any(|l| l.starts_with("WARNING: Filesystem at maximum capacity")));
    }

    #[test]
    fn test_report_serializes() {
        let table = Table::new();
        let json = serde_json::to_value(table.check_integrity()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["freeSlots"], MAX_RECORDS - 1);
        assert!(json["findings"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_lines_end_with_verdict() {
        let lines = Table::new().check_integrity().lines();
        assert_eq!(lines.last().map(String::as_str), Some("Filesystem is OK."));
    }
}
