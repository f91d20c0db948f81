//! Replacement of dependencies by their compact variants.
//!
//! Two modes are supported: an in-memory swap inside a [`DependencyGroup`]
//! that is discarded after a build, and a persisted swap that also edits
//! the manifest document in place, keeping its formatting.

use toml_edit::{value, DocumentMut, Item, Table, Value};
use tracing::{debug, info};

use crate::dependency::{
    canonicalize_name, Dependency, DependencyError, DependencyGroup, MAIN_GROUP,
};
use crate::rules::ReplaceRules;

/// Key holding the interpreter constraint in the dependency table
pub const PYTHON_KEY: &str = "python";

/// Errors for persisted rewrites
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("manifest entry '{0}' is not a table")]
    NotATable(&'static str),

    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

/// One performed replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub original: Dependency,
    pub replacement: Dependency,
}

/// Build the compact descriptor for a dependency.
///
/// Constraint metadata is copied verbatim; `alternate_source`, when given,
/// overrides the declared source.
pub fn compute_replacement(
    dependency: &Dependency,
    suffix: &str,
    alternate_source: Option<&str>,
) -> Dependency {
    Dependency {
        name: format!("{}{}", dependency.name, suffix),
        version_constraint: dependency.version_constraint.clone(),
        extras: dependency.extras.clone(),
        allows_prereleases: dependency.allows_prereleases,
        source_name: alternate_source
            .map(str::to_string)
            .or_else(|| dependency.source_name.clone()),
        python_constraint: dependency.python_constraint.clone(),
    }
}

/// Swap matching dependencies inside a live group without touching any file
pub fn soft_replace(
    group: &mut DependencyGroup,
    rules: &ReplaceRules,
    alternate_source: Option<&str>,
) -> Vec<Replacement> {
    let candidates: Vec<Dependency> = group
        .dependencies()
        .iter()
        .filter(|d| rules.is_replaceable(&d.name))
        .cloned()
        .collect();

    let mut replacements = Vec::with_capacity(candidates.len());
    for original in candidates {
        let replacement = compute_replacement(&original, rules.suffix(), alternate_source);
        debug!(from = %original.name, to = %replacement.name, "replacing dependency");
        group.add_dependency(replacement.clone());
        group.remove_dependency(&original.name);
        replacements.push(Replacement {
            original,
            replacement,
        });
    }
    replacements
}

/// Swap matching dependencies in the group and in the manifest document.
///
/// The interpreter constraint is pinned to `python_constraint` because
/// compiled artifacts only load under the interpreter that produced them.
/// Returns an empty list (and leaves the document untouched) when the
/// manifest has no dependency table.
pub fn hard_replace(
    document: &mut DocumentMut,
    group: &mut DependencyGroup,
    rules: &ReplaceRules,
    alternate_source: Option<&str>,
    python_constraint: &str,
) -> Result<Vec<Replacement>, RewriteError> {
    let Some(table) = dependencies_table_mut(document)? else {
        return Ok(Vec::new());
    };

    info!(python = python_constraint, "pinning interpreter constraint");
    set_value_preserving_decor(table, PYTHON_KEY, Value::from(python_constraint));

    let replacements = soft_replace(group, rules, alternate_source);
    for Replacement {
        original,
        replacement,
    } in &replacements
    {
        replace_key_in_place(
            table,
            &original.name,
            &replacement.name,
            value(replacement.to_inline_table()),
        );
    }

    Ok(replacements)
}

/// Read the main dependency group from `[tool.poetry.dependencies]`
pub fn read_main_group(document: &DocumentMut) -> Result<DependencyGroup, RewriteError> {
    let mut group = DependencyGroup::new(MAIN_GROUP);
    let Some(table) = dependencies_table(document)? else {
        return Ok(group);
    };

    for (name, item) in table.iter() {
        if name == PYTHON_KEY {
            continue;
        }
        group.add_dependency(Dependency::from_item(name, item)?);
    }
    Ok(group)
}

/// The interpreter constraint declared in the dependency table
pub fn python_requirement(document: &DocumentMut) -> Option<String> {
    dependencies_table(document)
        .ok()
        .flatten()
        .and_then(|table| table.get(PYTHON_KEY))
        .and_then(Item::as_str)
        .map(str::to_string)
}

fn dependencies_table(document: &DocumentMut) -> Result<Option<&Table>, RewriteError> {
    match document
        .get("tool")
        .and_then(|tool| tool.get("poetry"))
        .and_then(|poetry| poetry.get("dependencies"))
    {
        None => Ok(None),
        Some(item) => item
            .as_table()
            .map(Some)
            .ok_or(RewriteError::NotATable("tool.poetry.dependencies")),
    }
}

// `Item::get_mut` inserts missing keys, so descend through the tables
fn dependencies_table_mut(
    document: &mut DocumentMut,
) -> Result<Option<&mut Table>, RewriteError> {
    match document
        .as_table_mut()
        .get_mut("tool")
        .and_then(Item::as_table_like_mut)
        .and_then(|tool| tool.get_mut("poetry"))
        .and_then(Item::as_table_like_mut)
        .and_then(|poetry| poetry.get_mut("dependencies"))
    {
        None => Ok(None),
        Some(item) => item
            .as_table_mut()
            .map(Some)
            .ok_or(RewriteError::NotATable("tool.poetry.dependencies")),
    }
}

fn set_value_preserving_decor(table: &mut Table, key: &str, mut new_value: Value) {
    if let Some(existing) = table.get(key).and_then(Item::as_value) {
        *new_value.decor_mut() = existing.decor().clone();
    }
    table.insert(key, Item::Value(new_value));
}

/// Replace `old_key` by `new_key`, keeping the entry's position.
///
/// Entries after the replaced one are re-inserted with their original key
/// formatting so the table keeps its order.
fn replace_key_in_place(table: &mut Table, old_key: &str, new_key: &str, item: Item) {
    let canonical = canonicalize_name(old_key);
    let keys: Vec<String> = table.iter().map(|(key, _)| key.to_string()).collect();

    let Some(position) = keys.iter().position(|key| canonicalize_name(key) == canonical) else {
        table.insert(new_key, item);
        return;
    };

    table.remove(&keys[position]);
    table.insert(new_key, item);
    for key in &keys[position + 1..] {
        if let Some((key, trailing)) = table.remove_entry(key) {
            table.insert_formatted(&key, trailing);
        }
    }
}
