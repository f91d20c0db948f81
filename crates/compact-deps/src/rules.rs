//! Rules deciding which dependencies get a compact replacement.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dependency::canonicalize_name;

/// Suffix appended to compact distribution names
pub const DEFAULT_SUFFIX: &str = "-compact";

/// Match rules for dependency replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceRules {
    /// Exact names to replace (canonical form)
    names: BTreeSet<String>,

    /// Name prefixes to replace (canonical form)
    prefixes: Vec<String>,

    /// Suffix of compiled packages
    suffix: String,
}

impl Default for ReplaceRules {
    fn default() -> Self {
        Self::new(DEFAULT_SUFFIX)
    }
}

impl ReplaceRules {
    /// Create empty rules with the given suffix
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            names: BTreeSet::new(),
            prefixes: Vec::new(),
            suffix: suffix.into(),
        }
    }

    /// Add exact names
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.names
            .extend(names.into_iter().map(|n| canonicalize_name(n.as_ref())));
        self
    }

    /// Add name prefixes
    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prefixes.extend(
            prefixes
                .into_iter()
                .map(|p| canonicalize_name(p.as_ref()))
                .filter(|p| !p.is_empty()),
        );
        self
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// True when neither names nor prefixes are configured
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.prefixes.is_empty()
    }

    /// Decide whether a dependency name should be replaced.
    ///
    /// A name already carrying the suffix is never replaceable, so applying
    /// the rules twice cannot produce a double suffix.
    pub fn is_replaceable(&self, name: &str) -> bool {
        let canonical = canonicalize_name(name);
        if canonical.ends_with(&canonicalize_name(&self.suffix)) {
            return false;
        }

        self.names.contains(&canonical)
            || self
                .prefixes
                .iter()
                .any(|prefix| canonical.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_name_match() {
        let rules = ReplaceRules::default().with_names(["Foo_Bar"]);
        assert!(rules.is_replaceable("foo-bar"));
        assert!(rules.is_replaceable("FOO.BAR"));
        assert!(!rules.is_replaceable("foo"));
    }

    #[test]
    fn test_prefix_match() {
        let rules = ReplaceRules::default().with_prefixes(["acme-"]);
        assert!(rules.is_replaceable("acme-core"));
        assert!(rules.is_replaceable("acme_utils"));
        assert!(!rules.is_replaceable("other"));
    }

    #[test]
    fn test_suffixed_names_never_match() {
        let rules = ReplaceRules::default()
            .with_names(["foo-compact"])
            .with_prefixes(["foo"]);
        assert!(!rules.is_replaceable("foo-compact"));
        assert!(!rules.is_replaceable("foo_compact"));
        assert!(rules.is_replaceable("foo"));
    }

    #[test]
    fn test_empty_rules() {
        let rules = ReplaceRules::new("-bin").with_prefixes([""]);
        assert!(rules.is_empty());
        assert!(!rules.is_replaceable("anything"));
        assert_eq!(rules.suffix(), "-bin");
    }
}
