//! Runtime context for command execution.
//!
//! The [`RuntimeContext`] holds the state every command handler needs --
//! the resolved global flags -- plus the definition-file loader shared by
//! every subcommand.

use std::path::Path;

use anyhow::{Context, Result};
use schema_engine_core::definition::SchemaDefinition;

use crate::cli::GlobalArgs;

/// Runtime context passed to every command handler.
///
/// Constructed once in `main` after CLI parsing, before command dispatch.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Whether to produce JSON output.
    pub json: bool,

    /// Verbose output.
    pub verbose: bool,

    /// Quiet mode: suppress non-essential output.
    pub quiet: bool,
}

impl RuntimeContext {
    /// Build a `RuntimeContext` from parsed global arguments.
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        Self { json: global.json, verbose: global.verbose, quiet: global.quiet }
    }
}

/// Reads and parses a schema definition file, dispatching on extension:
/// `.json` via `serde_json`, `.yaml`/`.yml` via `serde_yaml`, anything else
/// is tried as JSON first and YAML on failure.
pub fn load_definition(path: &Path) -> Result<SchemaDefinition> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema definition at {}", path.display()))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parsed = match ext {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse {} as YAML", path.display()))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {} as JSON", path.display()))?,
        _ => serde_json::from_str(&contents)
            .or_else(|_| serde_yaml::from_str(&contents))
            .with_context(|| format!("failed to parse {} as JSON or YAML", path.display()))?,
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_json_definition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.json");
        std::fs::write(
            &path,
            r#"{"$schema":"https://forge.internal/schemas/forge-model/v1","model_id":"User","version":"1.0.0","table":"users","properties":{"id":{"type":"integer","database":{"primaryKey":true}}}}"#,
        )
        .unwrap();

        let def = load_definition(&path).unwrap();
        assert_eq!(def.model_id, "User");
    }

    #[test]
    fn loads_yaml_definition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.yaml");
        std::fs::write(
            &path,
            "$schema: https://forge.internal/schemas/forge-model/v1\nmodel_id: User\nversion: 1.0.0\ntable: users\nproperties:\n  id:\n    type: integer\n    database:\n      primaryKey: true\n",
        )
        .unwrap();

        let def = load_definition(&path).unwrap();
        assert_eq!(def.model_id, "User");
    }

    #[test]
    fn missing_file_errors() {
        let result = load_definition(Path::new("/nonexistent/definitely-missing.json"));
        assert!(result.is_err());
    }
}
