//! Dependency model and compact-variant rewriting.
//!
//! Reads the dependency table of a Python project manifest, decides which
//! dependencies have a precompiled ("compact") counterpart, and swaps them
//! either in memory or directly in the manifest document.

mod constraint;
mod dependency;
mod rewrite;
mod rules;

pub use constraint::to_pep440;
pub use dependency::{
    canonicalize_name, Dependency, DependencyError, DependencyGroup, ANY_CONSTRAINT, MAIN_GROUP,
};
pub use rewrite::{
    compute_replacement, hard_replace, python_requirement, read_main_group, soft_replace,
    Replacement, RewriteError, PYTHON_KEY,
};
pub use rules::{ReplaceRules, DEFAULT_SUFFIX};
