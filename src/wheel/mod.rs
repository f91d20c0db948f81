//! Wheel assembly
//!
//! Writes the dist-info directory (METADATA, WHEEL, RECORD) into a staged
//! tree and archives the tree as a `.whl` file.

mod archive;
mod verify;

pub use archive::{archive_timestamp, write_archive, SOURCE_DATE_EPOCH};
pub use verify::{verify_wheel, WheelReport};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::fsutil::FsError;
use crate::metadata::CoreMetadata;
use crate::python::PythonVersion;
use crate::record::{render_manifest, DigestEncoding, IntegrityRecord, RecordError};
use crate::stubs::stub_package_name;

/// Wheel format version written to WHEEL
pub const WHEEL_VERSION: &str = "1.0";

/// Generator line written to WHEEL
pub const GENERATOR: &str = concat!("compact-wheel ", env!("CARGO_PKG_VERSION"));

pub const METADATA_FILE: &str = "METADATA";
pub const WHEEL_FILE: &str = "WHEEL";
pub const RECORD_FILE: &str = "RECORD";

const STUB_SUMMARY_SUFFIX: &str = " typing stubs";

/// Errors for wheel assembly and verification
#[derive(Debug, thiserror::Error)]
pub enum WheelError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Wheel has no RECORD file")]
    MissingRecord,

    #[error("Wheel has more than one RECORD file: {0} and {1}")]
    MultipleRecords(String, String),

    #[error("RECORD must end with its own entry, found {0}")]
    ManifestEntryNotLast(String),

    #[error("RECORD lists {0} but the archive does not contain it")]
    MissingFile(String),

    #[error("Archive entry {0} is not listed in RECORD")]
    Unrecorded(String),

    #[error("Content of {0} does not match its RECORD entry")]
    RecordMismatch(String),
}

impl WheelError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> WheelError + '_ {
        move |source| WheelError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What the wheel contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WheelKind {
    /// Compiled bytecode, distributed as `{name}{suffix}`
    Compact { suffix: String },
    /// Typing stubs, distributed as `{importable_name}-stubs`
    Stubs { importable_name: String },
}

/// Identity of the wheel being built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelPackage {
    pub distribution_name: String,
    pub version: String,
    pub kind: WheelKind,
}

impl WheelPackage {
    pub fn new(
        distribution_name: impl Into<String>,
        version: impl Into<String>,
        kind: WheelKind,
    ) -> Self {
        Self {
            distribution_name: distribution_name.into(),
            version: version.into(),
            kind,
        }
    }

    /// Distribution name of the built wheel
    pub fn wheel_name(&self) -> String {
        match &self.kind {
            WheelKind::Compact { suffix } => format!("{}{}", self.distribution_name, suffix),
            WheelKind::Stubs { importable_name } => stub_package_name(importable_name),
        }
    }

    /// Wheel name as used in file and directory names
    pub fn dist_info_name(&self) -> String {
        self.wheel_name().replace('-', "_")
    }

    pub fn dist_info_dir(&self) -> String {
        format!("{}-{}.dist-info", self.dist_info_name(), self.version)
    }

    /// File name without extension, e.g. `foo_compact-1.0-py311-none-any`
    pub fn file_stem(&self, python: PythonVersion) -> String {
        format!(
            "{}-{}-{}-none-any",
            self.dist_info_name(),
            self.version,
            python.tag()
        )
    }
}

/// Render METADATA.
///
/// Every key is written once as a block holding all of its values, in the
/// order keys first appear. Stub wheels get their own name and an amended
/// summary.
pub fn render_metadata(metadata: &CoreMetadata, package: &WheelPackage) -> String {
    let is_stubs = matches!(package.kind, WheelKind::Stubs { .. });
    let mut lines = Vec::new();

    for key in metadata.keys() {
        if is_stubs && key.eq_ignore_ascii_case("Name") {
            lines.push(format!("Name: {}", package.wheel_name()));
            continue;
        }
        if is_stubs && key.eq_ignore_ascii_case("Summary") {
            let summary = metadata.get(key).unwrap_or_default();
            lines.push(format!("Summary: {}{}", summary, STUB_SUMMARY_SUFFIX));
            continue;
        }
        for value in metadata.get_all(key) {
            lines.push(format!("{}: {}", key, fold_value(value)));
        }
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

/// Indent continuation lines of a multi-line header value
fn fold_value(value: &str) -> String {
    value.trim_end_matches('\n').replace('\n', "\n        ")
}

/// Render WHEEL
pub fn render_wheel_descriptor(python: PythonVersion) -> String {
    format!(
        "Wheel-Version: {}\nGenerator: {}\nRoot-Is-Purelib: true\nTag: {}-none-any\n",
        WHEEL_VERSION,
        GENERATOR,
        python.tag()
    )
}

/// Turns a staged tree plus its records into a wheel file
#[derive(Debug, Clone)]
pub struct WheelAssembler {
    staging_root: PathBuf,
    output_dir: PathBuf,
    python: PythonVersion,
    encoding: DigestEncoding,
}

impl WheelAssembler {
    pub fn new(
        staging_root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        python: PythonVersion,
    ) -> Self {
        Self {
            staging_root: staging_root.into(),
            output_dir: output_dir.into(),
            python,
            encoding: DigestEncoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: DigestEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Write the dist-info directory and archive the staged tree.
    ///
    /// `records` cover the staged payload; the archive holds exactly the
    /// files they list plus the dist-info files. Returns the wheel path.
    pub fn assemble(
        &self,
        package: &WheelPackage,
        metadata: &CoreMetadata,
        mut records: Vec<IntegrityRecord>,
    ) -> Result<PathBuf, WheelError> {
        let meta_dir = self.staging_root.join(package.dist_info_dir());
        if meta_dir.exists() {
            return Err(FsError::DestinationExists(meta_dir).into());
        }
        fs::create_dir_all(&meta_dir).map_err(WheelError::io(&meta_dir))?;

        let metadata_content = render_metadata(metadata, package);
        records.push(self.write_file(&meta_dir.join(METADATA_FILE), metadata_content.as_bytes())?);

        let wheel_content = render_wheel_descriptor(self.python);
        records.push(self.write_file(&meta_dir.join(WHEEL_FILE), wheel_content.as_bytes())?);

        let record_path = meta_dir.join(RECORD_FILE);
        records.push(IntegrityRecord::manifest_entry(&self.staging_root, &record_path)?);
        fs::write(&record_path, render_manifest(&records)).map_err(WheelError::io(&record_path))?;

        fs::create_dir_all(&self.output_dir).map_err(WheelError::io(&self.output_dir))?;
        let stem = package.file_stem(self.python);
        let zip_path = self.output_dir.join(format!("{}.zip", stem));
        let wheel_path = self.output_dir.join(format!("{}.whl", stem));

        let entries: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        write_archive(&self.staging_root, &entries, &zip_path, archive_timestamp())?;
        fs::rename(&zip_path, &wheel_path).map_err(WheelError::io(&wheel_path))?;

        let wheel_path = fs::canonicalize(&wheel_path).map_err(WheelError::io(&wheel_path))?;
        info!(wheel = %wheel_path.display(), files = records.len(), "wheel written");
        Ok(wheel_path)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<IntegrityRecord, WheelError> {
        fs::write(path, content).map_err(WheelError::io(path))?;
        debug!(path = %path.display(), "wrote dist-info file");
        Ok(IntegrityRecord::for_content(
            &self.staging_root,
            path,
            content,
            self.encoding,
        )?)
    }
}
