//! Python project model
//!
//! Reads `pyproject.toml` with a format-preserving parser so dependency
//! rewrites can be written back without disturbing the rest of the file.

mod backup;
mod installer;

pub use backup::SettingsBackup;
pub use installer::{Installer, PoetryInstaller, DEFAULT_INSTALLER};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use compact_deps::{read_main_group, DependencyGroup, RewriteError};
use toml_edit::{DocumentMut, Item};

/// Project manifest file name
pub const PYPROJECT_FILE: &str = "pyproject.toml";

/// Lock file name
pub const LOCK_FILE: &str = "poetry.lock";

/// Errors for project manifest handling
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },

    #[error("Manifest {path} has no version and none was given")]
    MissingVersion { path: PathBuf },

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

/// A parsed `pyproject.toml`
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    path: PathBuf,
    document: DocumentMut,
}

impl ProjectManifest {
    /// Load `pyproject.toml` from a project directory
    pub fn load(project_dir: &Path) -> Result<Self, ProjectError> {
        let path = project_dir.join(PYPROJECT_FILE);
        let text = fs::read_to_string(&path).map_err(|source| ProjectError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(path, &text)
    }

    /// Parse manifest text that belongs at `path`
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self, ProjectError> {
        let path = path.into();
        let document = text
            .parse::<DocumentMut>()
            .map_err(|source| ProjectError::Parse {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &DocumentMut {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut DocumentMut {
        &mut self.document
    }

    /// Write the document back to its file
    pub fn save(&self) -> Result<(), ProjectError> {
        fs::write(&self.path, self.document.to_string()).map_err(|source| ProjectError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Look up a string field in `[tool.poetry]`, then `[project]`
    fn field(&self, key: &str) -> Option<&str> {
        self.poetry_item(key)
            .or_else(|| self.document.get("project").and_then(|p| p.get(key)))
            .and_then(Item::as_str)
    }

    fn poetry_item(&self, key: &str) -> Option<&Item> {
        self.document
            .get("tool")
            .and_then(|tool| tool.get("poetry"))
            .and_then(|poetry| poetry.get(key))
    }

    pub fn name(&self) -> Option<&str> {
        self.field("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.field("version")
    }

    pub fn description(&self) -> Option<&str> {
        self.field("description")
    }

    pub fn license(&self) -> Option<&str> {
        self.field("license")
    }

    /// `[tool.poetry].authors` entries, e.g. `Jane Doe <jane@example.com>`
    pub fn authors(&self) -> Vec<String> {
        self.string_array("authors")
    }

    pub fn maintainers(&self) -> Vec<String> {
        self.string_array("maintainers")
    }

    fn string_array(&self, key: &str) -> Vec<String> {
        self.poetry_item(key)
            .and_then(Item::as_array)
            .map(|array| {
                array
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `[tool.compact]` table as raw text, if present
    pub fn compact_table(&self) -> Option<String> {
        self.document
            .get("tool")
            .and_then(|tool| tool.get("compact"))
            .and_then(Item::as_table)
            .map(|table| table.to_string())
    }

    /// Main dependency group
    pub fn main_group(&self) -> Result<DependencyGroup, ProjectError> {
        Ok(read_main_group(&self.document)?)
    }
}

/// Who is being packaged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    /// Externally visible name (may contain hyphens)
    pub distribution_name: String,
    /// Import name on disk
    pub importable_name: String,
    pub version: String,
    /// Directory holding the package sources
    pub source_root: PathBuf,
}

impl PackageIdentity {
    /// Resolve the identity from arguments, falling back to defaults.
    ///
    /// The importable name defaults to the distribution name; the source
    /// root defaults to the importable name inside `project_dir`.
    pub fn resolve(
        distribution_name: &str,
        importable_name: Option<&str>,
        source_root: Option<&Path>,
        version: String,
        project_dir: &Path,
    ) -> Self {
        let importable_name = importable_name
            .map(str::to_string)
            .unwrap_or_else(|| distribution_name.to_string());

        let source_root = match source_root {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => project_dir.join(path),
            None => project_dir.join(&importable_name),
        };

        Self {
            distribution_name: distribution_name.to_string(),
            importable_name,
            version,
            source_root,
        }
    }
}

/// Split an author entry `Name <email>` into its parts
pub fn split_person(entry: &str) -> (Option<String>, Option<String>) {
    let entry = entry.trim();
    match (entry.find('<'), entry.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = entry[..open].trim();
            let email = entry[open + 1..close].trim();
            (
                (!name.is_empty()).then(|| name.to_string()),
                (!email.is_empty()).then(|| email.to_string()),
            )
        }
        _ => ((!entry.is_empty()).then(|| entry.to_string()), None),
    }
}
