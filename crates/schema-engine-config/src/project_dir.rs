//! Discovery of a schema-engine project's configuration file.
//!
//! A project root is any directory containing `schema-engine.toml` or
//! `schema-engine.yaml`. This module walks up the filesystem tree looking
//! for one, the way a build tool locates its nearest manifest.

use std::path::{Path, PathBuf};

use crate::config::ConfigError;

const CONFIG_FILE_NAMES: &[&str] = &["schema-engine.toml", "schema-engine.yaml", "schema-engine.yml"];

/// The name of the environment variable that can override the config file
/// path directly, bypassing directory walking.
const CONFIG_PATH_ENV: &str = "SCHEMA_ENGINE_CONFIG";

/// Walk up the directory tree from `start` looking for a recognized
/// schema-engine config file. The `SCHEMA_ENGINE_CONFIG` environment
/// variable, if set to an existing file, takes priority.
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(&env_path);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let start = start.canonicalize().ok()?;
    let mut current = start.as_path();
    loop {
        for name in CONFIG_FILE_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => break,
        }
    }
    None
}

/// [`find_project_config`], converting a miss into
/// [`ConfigError::ProjectNotFound`].
pub fn find_project_config_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_project_config(start).ok_or(ConfigError::ProjectNotFound)
}
