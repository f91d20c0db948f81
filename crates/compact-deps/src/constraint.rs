//! Conversion of manifest-style version constraints into PEP 440 specifiers.
//!
//! Manifests accept caret (`^1.2`) and tilde (`~1.2`) shorthands that
//! package metadata cannot carry, so `Requires-Dist` lines need the
//! expanded `>=lower,<upper` form.

use crate::dependency::ANY_CONSTRAINT;

/// Expand a constraint into a PEP 440 specifier set.
///
/// Returns `None` for the "any version" constraint. Parts that are not
/// caret, tilde or bare versions are passed through unchanged.
pub fn to_pep440(constraint: &str) -> Option<String> {
    let constraint = constraint.trim();
    if constraint.is_empty() || constraint == ANY_CONSTRAINT {
        return None;
    }

    let parts: Vec<String> = constraint
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(convert_part)
        .collect();

    Some(parts.join(","))
}

fn convert_part(part: &str) -> String {
    if let Some(version) = part.strip_prefix('^') {
        return bounded(version.trim(), caret_bump_index);
    }
    if let Some(version) = part.strip_prefix("~=") {
        return format!("~={}", version.trim());
    }
    if let Some(version) = part.strip_prefix('~') {
        return bounded(version.trim(), tilde_bump_index);
    }
    if part.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("=={}", part);
    }
    part.to_string()
}

fn bounded(version: &str, bump_index: fn(&[u64]) -> usize) -> String {
    let Some(release) = parse_release(version) else {
        return format!(">={}", version);
    };

    let index = bump_index(&release);
    let mut upper: Vec<u64> = release[..=index].to_vec();
    upper[index] += 1;
    upper.resize(release.len(), 0);

    let upper: Vec<String> = upper.iter().map(u64::to_string).collect();
    format!(">={},<{}", version, upper.join("."))
}

/// First non-zero component, or the last one when every component is zero
fn caret_bump_index(release: &[u64]) -> usize {
    release
        .iter()
        .position(|&component| component != 0)
        .unwrap_or(release.len() - 1)
}

fn tilde_bump_index(release: &[u64]) -> usize {
    if release.len() == 1 {
        0
    } else {
        1
    }
}

fn parse_release(version: &str) -> Option<Vec<u64>> {
    let release: Option<Vec<u64>> = version.split('.').map(|c| c.parse().ok()).collect();
    release.filter(|components| !components.is_empty())
}
