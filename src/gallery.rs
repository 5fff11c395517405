//! Read-time projection of stored analyses into a display-ready list.

use std::path::{Path, PathBuf};

use log::debug;

use crate::db::Analysis;

/// One gallery row: a name derived from the serial number and the resolved
/// path of the record's annotated image.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub display_name: String,
    pub image_path: PathBuf,
}

/// Maps records to gallery entries, preserving input order. Records whose
/// backing image no longer exists are skipped; a vanished file is a display
/// gap, not an error.
pub fn project(records: &[Analysis], pictures_dir: &Path) -> Vec<GalleryEntry> {
    let mut entries = Vec::with_capacity(records.len());

    for record in records {
        let image_path = pictures_dir.join(&record.image_reference);
        if !image_path.exists() {
            debug!(
                "Skipping analysis {}: image {} does not exist",
                record.serial_number,
                image_path.display()
            );
            continue;
        }

        entries.push(GalleryEntry {
            display_name: record.serial_number.to_string(),
            image_path,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(serial: i64, image_reference: &str) -> Analysis {
        Analysis {
            serial_number: serial,
            detected_objects: "[]".into(),
            image_reference: image_reference.into(),
        }
    }

    #[test]
    fn missing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("present.jpg"), b"x").unwrap();

        let records = vec![record(1, "present.jpg"), record(2, "gone.jpg")];
        let entries = project(&records, dir.path());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "1");
        assert!(entries.iter().all(|e| e.image_path.exists()));
    }

    #[test]
    fn input_order_is_preserved() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("b.jpg"), b"x").unwrap();

        let records = vec![record(20, "b.jpg"), record(10, "a.jpg")];
        let entries = project(&records, dir.path());

        let names: Vec<&str> = entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["20", "10"]);
    }

    #[test]
    fn empty_input_projects_to_empty_output() {
        let dir = TempDir::new().unwrap();
        assert!(project(&[], dir.path()).is_empty());
    }
}
