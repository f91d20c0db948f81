//! Built-in defaults (layer 1)

use std::path::PathBuf;

use compact_deps::DEFAULT_SUFFIX;
use serde::{Deserialize, Serialize};

use crate::fsutil::CollisionPolicy;
use crate::metadata::MetadataSource;
use crate::project::DEFAULT_INSTALLER;
use crate::python::DEFAULT_PYTHON;
use crate::record::DigestEncoding;
use crate::stubs::DEFAULT_STUBGEN;

/// Resolved build configuration.
///
/// Keys use the kebab-case spelling accepted in `[tool.compact]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompactConfig {
    /// Suffix of compact distribution names (default: "-compact")
    pub suffix: String,

    /// Dependency name prefixes to replace
    pub prefixes: Vec<String>,

    /// Exact dependency names to replace
    pub replace: Vec<String>,

    /// Package source for replaced dependencies
    pub dependency_source: Option<String>,

    /// Output directory for wheels, relative to the project (default: "dist")
    pub target: PathBuf,

    /// Strip docstrings and assertions (default: true)
    pub optimize: bool,

    /// Interpreter executable (default: "python3")
    pub python: String,

    /// Stub generator executable (default: "stubgen")
    pub stubgen: String,

    /// Installer executable (default: "poetry")
    pub installer: String,

    /// Glob patterns left out of the compiled package
    pub exclude: Vec<String>,

    pub collision_policy: CollisionPolicy,

    pub record_encoding: DigestEncoding,

    pub metadata: MetadataSource,

    /// Leave the staging directory in place (default: false)
    pub keep_artifacts: bool,

    /// Package whatever compiled when the compiler fails (default: false)
    pub ignore_compile_errors: bool,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
            prefixes: Vec::new(),
            replace: Vec::new(),
            dependency_source: None,
            target: PathBuf::from("dist"),
            optimize: true,
            python: DEFAULT_PYTHON.to_string(),
            stubgen: DEFAULT_STUBGEN.to_string(),
            installer: DEFAULT_INSTALLER.to_string(),
            exclude: Vec::new(),
            collision_policy: CollisionPolicy::default(),
            record_encoding: DigestEncoding::default(),
            metadata: MetadataSource::default(),
            keep_artifacts: false,
            ignore_compile_errors: false,
        }
    }
}

impl CompactConfig {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
