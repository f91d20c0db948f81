//! Zip archive writing

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::WheelError;

/// Environment variable fixing archive timestamps for reproducible builds
pub const SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";

/// Timestamp for archive entries: `SOURCE_DATE_EPOCH` when set, else now
pub fn archive_timestamp() -> zip::DateTime {
    let when = env::var(SOURCE_DATE_EPOCH)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0))
        .unwrap_or_else(Utc::now);
    to_zip_datetime(when)
}

/// Zip timestamps start at 1980; earlier times clamp to the minimum
fn to_zip_datetime(when: DateTime<Utc>) -> zip::DateTime {
    let Ok(year) = u16::try_from(when.year()) else {
        return zip::DateTime::default();
    };
    zip::DateTime::from_date_and_time(
        year,
        when.month() as u8,
        when.day() as u8,
        when.hour() as u8,
        when.minute() as u8,
        when.second() as u8,
    )
    .unwrap_or_default()
}

fn entry_path(root: &Path, name: &str) -> PathBuf {
    name.split('/').fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Archive `entries` (`/`-separated, relative to `root`) into `dest`, in order.
///
/// A partially written archive is removed on failure.
pub fn write_archive(
    root: &Path,
    entries: &[&str],
    dest: &Path,
    timestamp: zip::DateTime,
) -> Result<(), WheelError> {
    let result = write_entries(root, entries, dest, timestamp);
    if result.is_err() && dest.exists() {
        if let Err(e) = fs::remove_file(dest) {
            warn!(path = %dest.display(), "failed to remove partial archive: {}", e);
        }
    }
    result
}

fn write_entries(
    root: &Path,
    entries: &[&str],
    dest: &Path,
    timestamp: zip::DateTime,
) -> Result<(), WheelError> {
    let file = File::create(dest).map_err(WheelError::io(dest))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(timestamp)
        .unix_permissions(0o644);

    for name in entries {
        let path = entry_path(root, name);
        let content = fs::read(&path).map_err(WheelError::io(&path))?;
        zip.start_file(*name, options)?;
        zip.write_all(&content).map_err(WheelError::io(dest))?;
        debug!(entry = name, size = content.len(), "archived");
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test]
    fn test_entries_written_in_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("stage");
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/b.pyc"), b"bee").unwrap();
        fs::write(root.join("pkg/a.pyc"), b"ay").unwrap();

        let dest = dir.path().join("out.zip");
        write_archive(&root, &["pkg/b.pyc", "pkg/a.pyc"], &dest, zip::DateTime::default()).unwrap();

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(names.len(), 2);

        let first = archive.by_index(0).unwrap().name().to_string();
        assert_eq!(first, "pkg/b.pyc");

        let mut content = String::new();
        archive
            .by_name("pkg/a.pyc")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "ay");
    }

    #[test]
    fn test_failed_archive_removed() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.zip");
        let result = write_archive(dir.path(), &["missing.pyc"], &dest, zip::DateTime::default());
        assert!(matches!(result, Err(WheelError::Io { .. })));
        assert!(!dest.exists());
    }

    #[test]
    fn test_zip_datetime_conversion() {
        let when = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let converted = to_zip_datetime(when);
        assert_eq!(converted.year(), 2023);
        assert_eq!(converted.month(), 11);
        assert_eq!(converted.day(), 14);
        assert_eq!(converted.hour(), 22);
        assert_eq!(converted.minute(), 13);

        let early = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        assert_eq!(to_zip_datetime(early).year(), 1980);
    }
}
