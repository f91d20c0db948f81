//! Configuration merge system
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. Project config (`[tool.compact]` in pyproject.toml)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::CompactConfig;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
