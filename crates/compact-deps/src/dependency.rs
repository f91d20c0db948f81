//! Dependency descriptors and dependency groups.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use toml_edit::{Array, InlineTable, Item, Value};

use crate::constraint::to_pep440;

/// Constraint value meaning "any version".
pub const ANY_CONSTRAINT: &str = "*";

/// Name of the group holding runtime dependencies.
pub const MAIN_GROUP: &str = "main";

/// Errors raised while reading a dependency entry from a manifest
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("dependency '{name}' has unsupported constraint type: {kind}")]
    UnsupportedConstraint { name: String, kind: &'static str },

    #[error("dependency '{name}' field '{field}' must be a {expected}")]
    InvalidField {
        name: String,
        field: &'static str,
        expected: &'static str,
    },
}

/// Canonicalize a distribution name (lowercase, runs of `-_.` collapsed to `-`)
pub fn canonicalize_name(name: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATORS.get_or_init(|| Regex::new(r"[-_.]+").expect("valid separator pattern"));
    re.replace_all(name, "-").to_lowercase()
}

/// One entry in a dependency group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Declared name
    pub name: String,

    /// Version constraint as written (e.g. "^1.0")
    pub version_constraint: String,

    /// Requested extras
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub extras: BTreeSet<String>,

    /// Whether prereleases satisfy the constraint
    #[serde(default)]
    pub allows_prereleases: bool,

    /// Named package source the dependency resolves from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    /// Interpreter constraint (None means any interpreter)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_constraint: Option<String>,
}

impl Dependency {
    /// Create a dependency with only a version constraint
    pub fn new(name: impl Into<String>, version_constraint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_constraint: version_constraint.into(),
            extras: BTreeSet::new(),
            allows_prereleases: false,
            source_name: None,
            python_constraint: None,
        }
    }

    /// Canonical form of the name, used for lookups
    pub fn canonical_name(&self) -> String {
        canonicalize_name(&self.name)
    }

    /// Read a dependency from its manifest entry.
    ///
    /// Accepts both the short string form (`foo = "^1.0"`) and the table
    /// form (`foo = { version = "^1.0", extras = ["x"] }`).
    pub fn from_item(name: &str, item: &Item) -> Result<Self, DependencyError> {
        if let Some(constraint) = item.as_str() {
            return Ok(Self::new(name, constraint));
        }

        let table = item
            .as_table_like()
            .ok_or_else(|| DependencyError::UnsupportedConstraint {
                name: name.to_string(),
                kind: item.type_name(),
            })?;

        let string_field = |field: &'static str| -> Result<Option<String>, DependencyError> {
            match table.get(field) {
                None => Ok(None),
                Some(value) => value.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
                    DependencyError::InvalidField {
                        name: name.to_string(),
                        field,
                        expected: "string",
                    }
                }),
            }
        };

        let mut dependency = Self::new(
            name,
            string_field("version")?.unwrap_or_else(|| ANY_CONSTRAINT.to_string()),
        );
        dependency.source_name = string_field("source")?;
        dependency.python_constraint =
            string_field("python")?.filter(|python| python != ANY_CONSTRAINT);

        if let Some(value) = table.get("allow-prereleases") {
            dependency.allows_prereleases =
                value.as_bool().ok_or_else(|| DependencyError::InvalidField {
                    name: name.to_string(),
                    field: "allow-prereleases",
                    expected: "boolean",
                })?;
        }

        if let Some(value) = table.get("extras") {
            let array = value.as_array().ok_or_else(|| DependencyError::InvalidField {
                name: name.to_string(),
                field: "extras",
                expected: "array of strings",
            })?;
            for extra in array.iter() {
                let extra = extra.as_str().ok_or_else(|| DependencyError::InvalidField {
                    name: name.to_string(),
                    field: "extras",
                    expected: "array of strings",
                })?;
                dependency.extras.insert(extra.to_string());
            }
        }

        Ok(dependency)
    }

    /// Constraint table written back into the manifest.
    ///
    /// Optional fields are only present when they carry information.
    pub fn to_inline_table(&self) -> InlineTable {
        let mut table = InlineTable::new();
        table.insert("version", Value::from(self.version_constraint.as_str()));
        if self.allows_prereleases {
            table.insert("allow-prereleases", Value::from(true));
        }
        if let Some(source) = &self.source_name {
            table.insert("source", Value::from(source.as_str()));
        }
        if !self.extras.is_empty() {
            let extras: Array = self.extras.iter().map(String::as_str).collect();
            table.insert("extras", Value::Array(extras));
        }
        if let Some(python) = &self.python_constraint {
            table.insert("python", Value::from(python.as_str()));
        }
        table
    }

    /// Requirement without markers, e.g. `foo[bar] (>=1.0,<2.0)`
    pub fn to_pep508(&self) -> String {
        let mut requirement = self.name.clone();
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            requirement.push_str(&format!("[{}]", extras.join(",")));
        }
        if let Some(specifier) = to_pep440(&self.version_constraint) {
            requirement.push_str(&format!(" ({})", specifier));
        }
        requirement
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pep508())
    }
}

/// Ordered dependencies of one group, unique by canonical name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGroup {
    name: String,
    dependencies: Vec<Dependency>,
}

impl DependencyGroup {
    /// Create an empty group
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dependencies in declaration order
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Look up a dependency by name (canonicalized)
    pub fn get(&self, name: &str) -> Option<&Dependency> {
        let canonical = canonicalize_name(name);
        self.dependencies
            .iter()
            .find(|d| d.canonical_name() == canonical)
    }

    /// Add a dependency, replacing any existing entry with the same name
    pub fn add_dependency(&mut self, dependency: Dependency) {
        let canonical = dependency.canonical_name();
        match self
            .dependencies
            .iter_mut()
            .find(|d| d.canonical_name() == canonical)
        {
            Some(existing) => *existing = dependency,
            None => self.dependencies.push(dependency),
        }
    }

    /// Remove a dependency by name, returning it if present
    pub fn remove_dependency(&mut self, name: &str) -> Option<Dependency> {
        let canonical = canonicalize_name(name);
        let index = self
            .dependencies
            .iter()
            .position(|d| d.canonical_name() == canonical)?;
        Some(self.dependencies.remove(index))
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
