//! Effective configuration with provenance
//!
//! Captures the merged configuration plus where each layer came from.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::defaults::CompactConfig;
use super::merge::merge_layers;

/// Table of pyproject.toml holding project configuration
pub const CONFIG_TABLE: &str = "compact";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Project,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration and the sources that produced it
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: CompactConfig,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build effective config from layers.
    ///
    /// A missing `pyproject.toml`, or one without a `[tool.compact]` table,
    /// contributes nothing.
    pub fn build(
        pyproject_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        // Layer 1: Built-in defaults
        layers.push(CompactConfig::default().to_value());
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        // Layer 2: Project config
        if let Some(path) = pyproject_path {
            if path.exists() {
                if let Some((value, digest)) = Self::load_project_table(path)? {
                    layers.push(value);
                    sources.push(ConfigSource {
                        origin: ConfigOrigin::Project,
                        path: Some(path.to_string_lossy().to_string()),
                        digest: Some(digest),
                    });
                }
            }
        }

        // Layer 3: CLI overrides
        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let config: CompactConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Self::validate_config(&config)?;

        debug!(?sources, "configuration loaded");
        Ok(Self { config, sources })
    }

    /// Read `[tool.compact]`, returning the table and the file digest
    fn load_project_table(path: &Path) -> Result<Option<(Value, String)>, ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

        let document: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        let table = document
            .get("tool")
            .and_then(|tool| tool.get(CONFIG_TABLE))
            .cloned();

        Ok(table.map(|table| (Self::toml_to_json(table), digest)))
    }

    /// Convert TOML Value to JSON Value
    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Self::toml_to_json).collect())
            }
            toml::Value::Table(table) => {
                let map: serde_json::Map<String, Value> = table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect();
                Value::Object(map)
            }
        }
    }

    fn validate_config(config: &CompactConfig) -> Result<(), ConfigError> {
        if config.suffix.is_empty() || config.suffix.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError(
                "suffix must be non-empty and contain no whitespace".to_string(),
            ));
        }
        if config.target.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "target must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
