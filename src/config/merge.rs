//! Layer merging for configuration values
//!
//! Tables merge key by key, anything else (arrays included) is replaced by
//! the higher layer.

use serde_json::Value;

/// Merge `overlay` into `base` in place.
///
/// A `null` in the overlay clears the key, so a CLI layer can unset a
/// project setting such as `dependency-source`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(table), Value::Object(entries)) => {
            for (key, value) in entries {
                match table.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Fold layers lowest precedence first
pub fn merge_layers<I>(layers: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    let mut merged = Value::Null;
    for layer in layers {
        deep_merge(&mut merged, layer);
    }
    merged
}
