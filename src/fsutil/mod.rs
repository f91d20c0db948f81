//! Filesystem utilities for assembling wheel trees
//!
//! Removal of staging trees, purging of bytecode caches, relocation of
//! compiled artifacts into a package layout and discovery of stub files.

mod exclude;

pub use exclude::{ExcludeError, ExcludeRules};

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::record::{DigestEncoding, IntegrityRecord, RecordError};

/// Directory name the compiler writes bytecode into
pub const BYTECODE_CACHE_DIR: &str = "__pycache__";

/// Extension of compiled bytecode files
pub const BYTECODE_EXTENSION: &str = "pyc";

/// Extension of typing stub files
pub const STUB_EXTENSION: &str = "pyi";

/// Errors for filesystem operations
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("Source directory does not exist: {0}")]
    MissingSource(PathBuf),

    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("Compiled files {first} and {second} both map to {target}")]
    NameCollision {
        target: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Stub generator produced no output directory at {0}")]
    MissingStubOutput(PathBuf),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Exclude rules error: {0}")]
    Exclude(#[from] ExcludeError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

impl FsError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> FsError + '_ {
        move |source| FsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What to do when two compiled files normalize to the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Abort with [`FsError::NameCollision`]
    #[default]
    Error,
    /// Keep the file visited last and log a warning
    LastWins,
}

/// Remove a directory and everything below it, children first
pub fn remove_tree(path: &Path) -> Result<(), FsError> {
    for entry in WalkDir::new(path).follow_links(false).contents_first(true) {
        let entry = entry?;
        let entry_path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(entry_path).map_err(FsError::io(entry_path))?;
        } else {
            fs::remove_file(entry_path).map_err(FsError::io(entry_path))?;
        }
    }
    Ok(())
}

/// Remove every bytecode cache directory below `path`.
///
/// Returns the number of cache directories removed; ordinary directories
/// are walked but never deleted.
pub fn purge_bytecode_cache(path: &Path) -> Result<usize, FsError> {
    if !path.is_dir() {
        return Err(FsError::MissingSource(path.to_path_buf()));
    }

    let mut caches = Vec::new();
    let mut walker = WalkDir::new(path).follow_links(false).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        if entry.file_type().is_dir() && entry.file_name() == OsStr::new(BYTECODE_CACHE_DIR) {
            caches.push(entry.into_path());
            walker.skip_current_dir();
        }
    }

    for cache in &caches {
        debug!(path = %cache.display(), "removing bytecode cache");
        remove_tree(cache)?;
    }
    Ok(caches.len())
}

/// Strip interpreter and optimization tags from a compiled file name.
///
/// `mod.cpython-311.opt-2.pyc` becomes `mod.pyc`.
pub fn normalize_compiled_name(file_name: &str) -> String {
    let stem = file_name
        .strip_suffix(&format!(".{}", BYTECODE_EXTENSION))
        .unwrap_or(file_name);
    let first = stem.split('.').next().unwrap_or(stem);
    format!("{}.{}", first, BYTECODE_EXTENSION)
}

/// Relative path with bytecode cache components removed
fn flatten_cache_components(relative: &Path) -> PathBuf {
    relative
        .components()
        .filter(|component| match component {
            Component::Normal(name) => name.to_str() != Some(BYTECODE_CACHE_DIR),
            _ => true,
        })
        .collect()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension() == Some(OsStr::new(extension))
}

/// Copies compiled bytecode from a source tree into a package layout
#[derive(Debug, Clone)]
pub struct ArtifactRelocator {
    source_root: PathBuf,
    dest_root: PathBuf,
    base: Option<PathBuf>,
    collision_policy: CollisionPolicy,
    excludes: ExcludeRules,
    encoding: DigestEncoding,
}

impl ArtifactRelocator {
    /// Relocate from `source_root` into `dest_root`
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            base: None,
            collision_policy: CollisionPolicy::default(),
            excludes: ExcludeRules::default(),
            encoding: DigestEncoding::default(),
        }
    }

    /// Directory records are relative to (default: parent of `dest_root`)
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn with_excludes(mut self, excludes: ExcludeRules) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn with_encoding(mut self, encoding: DigestEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    fn base(&self) -> PathBuf {
        match &self.base {
            Some(base) => base.clone(),
            None => self
                .dest_root
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.dest_root.clone()),
        }
    }

    /// Copy every compiled file, returning one record per file written
    pub fn relocate(&self) -> Result<Vec<IntegrityRecord>, FsError> {
        if !self.source_root.is_dir() {
            return Err(FsError::MissingSource(self.source_root.clone()));
        }
        fs::create_dir_all(&self.dest_root).map_err(FsError::io(&self.dest_root))?;

        let base = self.base();
        // target -> (source, index into records)
        let mut written: BTreeMap<PathBuf, (PathBuf, usize)> = BTreeMap::new();
        let mut records: Vec<Option<IntegrityRecord>> = Vec::new();

        let mut walker = WalkDir::new(&self.source_root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry?;
            let path = entry.path();
            let relative = path
                .strip_prefix(&self.source_root)
                .map_err(|_| RecordError::PathNotInBase(path.to_path_buf()))?;

            // Skip root itself
            if relative.as_os_str().is_empty() {
                continue;
            }

            let mirrored = flatten_cache_components(relative);

            if entry.file_type().is_dir() {
                if entry.file_name() == OsStr::new(BYTECODE_CACHE_DIR) {
                    continue;
                }
                if self.excludes.is_excluded(&mirrored) {
                    walker.skip_current_dir();
                    continue;
                }
                let dest_dir = self.dest_root.join(&mirrored);
                fs::create_dir_all(&dest_dir).map_err(FsError::io(&dest_dir))?;
                continue;
            }

            if !has_extension(path, BYTECODE_EXTENSION) {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            let target_relative = mirrored
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(normalize_compiled_name(&file_name));
            if self.excludes.is_excluded(&target_relative) {
                debug!(path = %relative.display(), "excluded");
                continue;
            }

            let target = self.dest_root.join(&target_relative);
            if let Some((first, index)) = written.get(&target) {
                match self.collision_policy {
                    CollisionPolicy::Error => {
                        return Err(FsError::NameCollision {
                            target,
                            first: first.clone(),
                            second: path.to_path_buf(),
                        });
                    }
                    CollisionPolicy::LastWins => {
                        warn!(
                            target = %target.display(),
                            replaced = %first.display(),
                            by = %path.display(),
                            "compiled file name collision, keeping the later file"
                        );
                        records[*index] = None;
                    }
                }
            }

            let content = fs::read(path).map_err(FsError::io(path))?;
            fs::write(&target, &content).map_err(FsError::io(&target))?;
            debug!(from = %path.display(), to = %target.display(), "relocated compiled file");

            records.push(Some(IntegrityRecord::for_content(
                &base,
                &target,
                &content,
                self.encoding,
            )?));
            written.insert(target, (path.to_path_buf(), records.len() - 1));
        }

        Ok(records.into_iter().flatten().collect())
    }
}

/// Relocate compiled artifacts with default settings.
///
/// Records are relative to `base`.
pub fn relocate_compiled_artifacts(
    source_root: &Path,
    dest_root: &Path,
    base: &Path,
) -> Result<Vec<IntegrityRecord>, FsError> {
    ArtifactRelocator::new(source_root, dest_root)
        .with_base(base)
        .relocate()
}

/// Records for every stub file below `path`, relative to `base`
pub fn list_stub_files(
    path: &Path,
    base: &Path,
    encoding: DigestEncoding,
) -> Result<Vec<IntegrityRecord>, FsError> {
    if !path.is_dir() {
        return Err(FsError::MissingSource(path.to_path_buf()));
    }

    let mut records = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), STUB_EXTENSION) {
            continue;
        }
        let content = fs::read(entry.path()).map_err(FsError::io(entry.path()))?;
        records.push(IntegrityRecord::for_content(
            base,
            entry.path(),
            &content,
            encoding,
        )?);
    }
    Ok(records)
}
