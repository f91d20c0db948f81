//! Core metadata for built wheels
//!
//! A [`MetadataProvider`] supplies the `METADATA` fields of the package being
//! compiled. Two sources exist: the metadata of the installed distribution as
//! reported by the interpreter, and metadata synthesized from the project
//! manifest.

use std::path::PathBuf;

use compact_deps::{soft_replace, ReplaceRules};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::project::{split_person, ProjectError, ProjectManifest};
use crate::python::{Interpreter, PythonVersion};
use crate::tool::{capture, ToolError};

/// Metadata-Version written for synthesized metadata
pub const METADATA_VERSION: &str = "2.1";

/// License written for synthesized metadata when the manifest has none
pub const DEFAULT_LICENSE: &str = "Proprietary";

/// Errors for metadata providers
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Invalid metadata output: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Which provider supplies metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    /// Installed distribution, via `importlib.metadata`
    #[default]
    Installed,
    /// Synthesized from `pyproject.toml`
    Project,
}

/// Ordered multi-map of metadata fields.
///
/// Keys compare case-insensitively, like email headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreMetadata {
    fields: Vec<(String, String)>,
}

impl CoreMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// Builder form of [`CoreMetadata::push`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key` in insertion order
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Distinct keys in first-occurrence order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.fields {
            if !keys.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, String)> for CoreMetadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Supplies metadata for a distribution
pub trait MetadataProvider {
    fn metadata(&self, distribution_name: &str) -> Result<CoreMetadata, MetadataError>;
}

const INSTALLED_METADATA_SCRIPT: &str = "import importlib.metadata as m, json, sys; \
     json.dump([[k, v] for k, v in m.metadata(sys.argv[1]).items()], sys.stdout)";

/// Reads metadata of an installed distribution through the interpreter
#[derive(Debug, Clone)]
pub struct InstalledMetadata {
    interpreter: Interpreter,
}

impl InstalledMetadata {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }
}

impl MetadataProvider for InstalledMetadata {
    fn metadata(&self, distribution_name: &str) -> Result<CoreMetadata, MetadataError> {
        let mut command = self.interpreter.command();
        command.args(["-c", INSTALLED_METADATA_SCRIPT, distribution_name]);
        let output = capture(&mut command)?;

        let pairs: Vec<(String, String)> = serde_json::from_str(&output)?;
        debug!(
            distribution = distribution_name,
            fields = pairs.len(),
            "read installed metadata"
        );
        Ok(pairs.into_iter().collect())
    }
}

/// Synthesizes metadata for the compact distribution from `pyproject.toml`.
///
/// The manifest is read on every call so rewrites made earlier in a build
/// are reflected in `Requires-Dist`.
#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    project_dir: PathBuf,
    python: PythonVersion,
    suffix: String,
    rules: Option<ReplaceRules>,
    alternate_source: Option<String>,
}

impl ProjectMetadata {
    pub fn new(project_dir: impl Into<PathBuf>, python: PythonVersion, suffix: &str) -> Self {
        Self {
            project_dir: project_dir.into(),
            python,
            suffix: suffix.to_string(),
            rules: None,
            alternate_source: None,
        }
    }

    /// Swap matching dependencies for their compact variants in
    /// `Requires-Dist` without touching the manifest
    pub fn with_replacements(
        mut self,
        rules: ReplaceRules,
        alternate_source: Option<String>,
    ) -> Self {
        self.rules = Some(rules);
        self.alternate_source = alternate_source;
        self
    }

    /// Metadata for an already loaded manifest
    pub fn from_manifest(
        &self,
        manifest: &ProjectManifest,
        distribution_name: &str,
    ) -> Result<CoreMetadata, MetadataError> {
        let mut group = manifest.main_group()?;
        if let Some(rules) = &self.rules {
            let replaced = soft_replace(&mut group, rules, self.alternate_source.as_deref());
            debug!(count = replaced.len(), "replaced dependencies in metadata");
        }

        let name = manifest.name().unwrap_or(distribution_name);
        let mut metadata = CoreMetadata::new()
            .with("Metadata-Version", METADATA_VERSION)
            .with("Name", format!("{}{}", name, self.suffix));
        if let Some(version) = manifest.version() {
            metadata.push("Version", version);
        }
        if let Some(summary) = manifest.description() {
            metadata.push("Summary", summary);
        }
        metadata.push("License", manifest.license().unwrap_or(DEFAULT_LICENSE));
        metadata.push("Requires-Python", self.python.requires_python());

        push_people(&mut metadata, "Author", &manifest.authors());
        push_people(&mut metadata, "Maintainer", &manifest.maintainers());

        let mut requirements: Vec<_> = group.dependencies().iter().collect();
        requirements.sort_by(|a, b| a.canonical_name().cmp(&b.canonical_name()));
        for dependency in requirements {
            metadata.push("Requires-Dist", dependency.to_pep508());
        }

        Ok(metadata)
    }
}

fn push_people(metadata: &mut CoreMetadata, role: &str, entries: &[String]) {
    let (names, emails): (Vec<_>, Vec<_>) = entries.iter().map(|e| split_person(e)).unzip();
    let names: Vec<String> = names.into_iter().flatten().collect();
    let emails: Vec<String> = emails.into_iter().flatten().collect();
    if !names.is_empty() {
        metadata.push(role, names.join(", "));
    }
    if !emails.is_empty() {
        metadata.push(format!("{}-email", role), emails.join(", "));
    }
}

impl MetadataProvider for ProjectMetadata {
    fn metadata(&self, distribution_name: &str) -> Result<CoreMetadata, MetadataError> {
        let manifest = ProjectManifest::load(&self.project_dir)?;
        self.from_manifest(&manifest, distribution_name)
    }
}
