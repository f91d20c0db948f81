//! RECORD manifest entries
//!
//! One integrity record per packaged file: `path,sha256=digest,size`.
//! The RECORD file lists itself last with empty hash and size (`path,,`).

use std::fmt;
use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash algorithm written into every record
pub const HASH_ALGORITHM: &str = "sha256";

/// How the digest is rendered in RECORD lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestEncoding {
    /// Lowercase hexadecimal
    #[default]
    Hex,
    /// URL-safe base64 without padding
    Base64,
}

impl DigestEncoding {
    /// Encode a raw digest
    pub fn encode(self, digest: &[u8]) -> String {
        match self {
            DigestEncoding::Hex => hex::encode(digest),
            DigestEncoding::Base64 => URL_SAFE_NO_PAD.encode(digest),
        }
    }

    /// Guess the encoding of an encoded SHA-256 digest
    pub fn detect(encoded: &str) -> Self {
        if encoded.len() == 64 && encoded.bytes().all(|b| b.is_ascii_hexdigit()) {
            DigestEncoding::Hex
        } else {
            DigestEncoding::Base64
        }
    }
}

/// Errors for record construction and parsing
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Path is not within packaging root: {0}")]
    PathNotInBase(PathBuf),

    #[error("Malformed RECORD line: {0}")]
    Malformed(String),
}

/// Compute the encoded SHA-256 digest of bytes
pub fn digest(content: &[u8], encoding: DigestEncoding) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    encoding.encode(&hasher.finalize())
}

/// Path of `path` relative to `base`, always `/`-separated
pub fn relative_record_path(base: &Path, path: &Path) -> Result<String, RecordError> {
    let relative = path
        .strip_prefix(base)
        .map_err(|_| RecordError::PathNotInBase(path.to_path_buf()))?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        return Err(RecordError::PathNotInBase(path.to_path_buf()));
    }
    Ok(parts.join("/"))
}

/// A single RECORD entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityRecord {
    /// Path relative to the packaging root
    pub path: String,

    /// Encoded digest (None for the RECORD file itself)
    pub digest: Option<String>,

    /// Size in bytes (None for the RECORD file itself)
    pub size: Option<u64>,
}

impl IntegrityRecord {
    /// Record for a file whose content is already in memory
    pub fn for_content(
        base: &Path,
        path: &Path,
        content: &[u8],
        encoding: DigestEncoding,
    ) -> Result<Self, RecordError> {
        Ok(Self {
            path: relative_record_path(base, path)?,
            digest: Some(digest(content, encoding)),
            size: Some(content.len() as u64),
        })
    }

    /// The self-referential entry of the RECORD file
    pub fn manifest_entry(base: &Path, path: &Path) -> Result<Self, RecordError> {
        Ok(Self {
            path: relative_record_path(base, path)?,
            digest: None,
            size: None,
        })
    }

    /// True for the RECORD file's own entry
    pub fn is_manifest_entry(&self) -> bool {
        self.digest.is_none() && self.size.is_none()
    }

    /// Check the record against file content
    pub fn matches(&self, content: &[u8], encoding: DigestEncoding) -> bool {
        match (&self.digest, self.size) {
            (Some(expected), Some(size)) => {
                size == content.len() as u64 && *expected == digest(content, encoding)
            }
            _ => false,
        }
    }

    /// Parse one RECORD line
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let malformed = || RecordError::Malformed(line.to_string());

        let (path, rest) = if let Some(quoted) = line.strip_prefix('"') {
            let end = quoted.find("\",").ok_or_else(malformed)?;
            (quoted[..end].replace("\"\"", "\""), &quoted[end + 2..])
        } else {
            let (path, rest) = line.split_once(',').ok_or_else(malformed)?;
            (path.to_string(), rest)
        };

        let (hash, size) = rest.split_once(',').ok_or_else(malformed)?;
        if hash.is_empty() && size.is_empty() {
            return Ok(Self {
                path,
                digest: None,
                size: None,
            });
        }

        let digest = hash
            .strip_prefix(HASH_ALGORITHM)
            .and_then(|h| h.strip_prefix('='))
            .ok_or_else(malformed)?;
        let size = size.trim().parse::<u64>().map_err(|_| malformed())?;

        Ok(Self {
            path,
            digest: Some(digest.to_string()),
            size: Some(size),
        })
    }
}

impl fmt::Display for IntegrityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.contains([',', '"']) {
            write!(f, "\"{}\"", self.path.replace('"', "\"\""))?;
        } else {
            f.write_str(&self.path)?;
        }

        match (&self.digest, self.size) {
            (Some(digest), Some(size)) => write!(f, ",{}={},{}", HASH_ALGORITHM, digest, size),
            _ => f.write_str(",,"),
        }
    }
}

/// Render records as RECORD file content (one line each, newline terminated)
pub fn render_manifest(records: &[IntegrityRecord]) -> String {
    let mut content = String::new();
    for record in records {
        content.push_str(&record.to_string());
        content.push('\n');
    }
    content
}
