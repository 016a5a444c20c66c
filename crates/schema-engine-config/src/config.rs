//! Configuration types and loading for the schema lifecycle engine.
//!
//! The main entry point is [`SchemaEngineConfig`], layered from defaults, an
//! optional `schema-engine.toml`/`.yaml` file, and `SCHEMA_ENGINE_`-prefixed
//! environment variables via [`figment`].

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use schema_engine_core::definition::META_SCHEMA_ID;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `figment` failed to merge or parse a layer.
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),

    /// No project file (`schema-engine.toml`/`.yaml`) was found walking up
    /// from the start directory.
    #[error("no schema-engine project file found (expected schema-engine.toml or .yaml)")]
    ProjectNotFound,

    /// A configuration value failed its own sanity check.
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Bounds on accepted identifiers (`model_id`, `table`, column names),
/// enforced by the Schema Validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentifierBounds {
    #[serde(default = "default_min_identifier_length")]
    pub min_length: u32,
    #[serde(default = "default_max_identifier_length")]
    pub max_length: u32,
}

impl Default for IdentifierBounds {
    fn default() -> Self {
        Self {
            min_length: default_min_identifier_length(),
            max_length: default_max_identifier_length(),
        }
    }
}

fn default_min_identifier_length() -> u32 {
    1
}

/// PostgreSQL truncates identifiers past 63 bytes; this is the safe default.
fn default_max_identifier_length() -> u32 {
    63
}

/// The full schema lifecycle engine configuration, corresponding to
/// `schema-engine.toml`/`schema-engine.yaml`.
///
/// All fields carry `serde` defaults so a partially-specified file still
/// deserializes to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaEngineConfig {
    /// Path to the SQLite database file, relative to the project root
    /// unless absolute. `:memory:` opens an in-memory store.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// The `$schema` dialect identifier every accepted definition must
    /// match.
    #[serde(default = "default_dialect")]
    pub meta_schema_dialect: String,

    /// Maximum depth a dependency-chain/dependents traversal walks before
    /// stopping, guarding against pathologically deep graphs.
    #[serde(default = "default_dependency_max_depth")]
    pub dependency_max_depth: u32,

    /// `strftime`-style format used when naming generated migrations.
    #[serde(default = "default_migration_timestamp_format")]
    pub migration_timestamp_format: String,

    /// Bounds enforced on `model_id`/`table`/column identifiers.
    #[serde(default)]
    pub identifier_bounds: IdentifierBounds,

    /// Actor recorded against changes when the caller does not supply one
    /// explicitly.
    #[serde(default = "default_actor")]
    pub default_actor: String,
}

impl Default for SchemaEngineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            meta_schema_dialect: default_dialect(),
            dependency_max_depth: default_dependency_max_depth(),
            migration_timestamp_format: default_migration_timestamp_format(),
            identifier_bounds: IdentifierBounds::default(),
            default_actor: default_actor(),
        }
    }
}

fn default_db_path() -> String {
    "schema-engine.db".to_string()
}

fn default_dialect() -> String {
    META_SCHEMA_ID.to_string()
}

fn default_dependency_max_depth() -> u32 {
    10
}

fn default_migration_timestamp_format() -> String {
    "%Y%m%d%H%M%S".to_string()
}

fn default_actor() -> String {
    "system".to_string()
}

impl SchemaEngineConfig {
    /// Validates cross-field invariants a plain `serde` default cannot
    /// express.
    pub fn validate(&self) -> Result<()> {
        if self.identifier_bounds.min_length > self.identifier_bounds.max_length {
            return Err(ConfigError::InvalidValue {
                key: "identifier_bounds".to_string(),
                reason: "min_length exceeds max_length".to_string(),
            });
        }
        if self.identifier_bounds.max_length > 63 {
            return Err(ConfigError::InvalidValue {
                key: "identifier_bounds.max_length".to_string(),
                reason: "PostgreSQL identifiers cannot exceed 63 bytes".to_string(),
            });
        }
        if self.dependency_max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "dependency_max_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads configuration from defaults, an optional config file at
/// `config_path` (`.toml`, else `.yaml`/`.yml`), and `SCHEMA_ENGINE_`-
/// prefixed environment variables, in that priority order (env overrides
/// file overrides defaults).
///
/// A missing `config_path` is not an error: the file layer is simply
/// skipped and defaults (possibly overridden by environment) are used.
pub fn load_config(config_path: Option<&Path>) -> Result<SchemaEngineConfig> {
    let mut figment = Figment::new().merge(Serialized::defaults(SchemaEngineConfig::default()));

    if let Some(path) = config_path {
        if path.exists() {
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
    }

    let config: SchemaEngineConfig = figment.merge(Env::prefixed("SCHEMA_ENGINE_")).extract()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = SchemaEngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.dependency_max_depth, 10);
        assert_eq!(cfg.meta_schema_dialect, META_SCHEMA_ID);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config(Some(Path::new("/nonexistent/schema-engine.toml"))).unwrap();
        assert_eq!(cfg, SchemaEngineConfig::default());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema-engine.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "dependency_max_depth = 5").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.dependency_max_depth, 5);
        assert_eq!(cfg.db_path, default_db_path());
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema-engine.yaml");
        std::fs::write(&path, "db_path: custom.db\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.db_path, "custom.db");
        assert_eq!(cfg.dependency_max_depth, default_dependency_max_depth());
    }

    #[test]
    fn invalid_bounds_rejected() {
        let mut cfg = SchemaEngineConfig::default();
        cfg.identifier_bounds.min_length = 100;
        cfg.identifier_bounds.max_length = 10;
        assert!(cfg.validate().is_err());
    }
}
