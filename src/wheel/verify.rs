//! Integrity check of a built wheel

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use super::{WheelError, RECORD_FILE};
use crate::record::{DigestEncoding, IntegrityRecord};

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelReport {
    /// Archive path of the RECORD file
    pub record_path: String,
    /// Files checked against their records (RECORD excluded)
    pub verified: usize,
}

fn is_record_path(name: &str) -> bool {
    match name.split_once('/') {
        Some((dir, file)) => dir.ends_with(".dist-info") && file == RECORD_FILE,
        None => false,
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>, WheelError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(WheelError::MissingFile(name.to_string())),
        Err(e) => return Err(e.into()),
    };
    let mut content = Vec::new();
    entry
        .read_to_end(&mut content)
        .map_err(WheelError::io(Path::new(name)))?;
    Ok(content)
}

/// Re-read a wheel and check every RECORD line against the archived bytes.
///
/// RECORD must end with its own entry, every listed file must exist with
/// matching digest and size, and every archived file must be listed.
pub fn verify_wheel(path: &Path) -> Result<WheelReport, WheelError> {
    let file = File::open(path).map_err(WheelError::io(path))?;
    let mut archive = ZipArchive::new(file)?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();

    let mut record_path: Option<String> = None;
    for name in names.iter().filter(|n| is_record_path(n)) {
        if let Some(first) = &record_path {
            return Err(WheelError::MultipleRecords(first.clone(), name.clone()));
        }
        record_path = Some(name.clone());
    }
    let record_path = record_path.ok_or(WheelError::MissingRecord)?;

    let content = read_entry(&mut archive, &record_path)?;
    let records = String::from_utf8_lossy(&content)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(IntegrityRecord::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let (last, payload) = records.split_last().ok_or(WheelError::MissingRecord)?;
    if !last.is_manifest_entry() || last.path != record_path {
        return Err(WheelError::ManifestEntryNotLast(last.path.clone()));
    }

    let mut listed: HashSet<&str> = HashSet::new();
    listed.insert(record_path.as_str());
    for record in payload {
        let Some(digest) = &record.digest else {
            return Err(WheelError::ManifestEntryNotLast(record.path.clone()));
        };
        let content = read_entry(&mut archive, &record.path)?;
        if !record.matches(&content, DigestEncoding::detect(digest)) {
            return Err(WheelError::RecordMismatch(record.path.clone()));
        }
        debug!(path = %record.path, "verified");
        listed.insert(record.path.as_str());
    }

    for name in &names {
        if !name.ends_with('/') && !listed.contains(name.as_str()) {
            return Err(WheelError::Unrecorded(name.clone()));
        }
    }

    Ok(WheelReport {
        record_path,
        verified: payload.len(),
    })
}
