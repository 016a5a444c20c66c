//! Configuration loading for the schema lifecycle engine.
//!
//! Loads a layered [`config::SchemaEngineConfig`] from defaults, an
//! optional `schema-engine.toml`/`.yaml` file, and `SCHEMA_ENGINE_`-prefixed
//! environment variables, with [`project_dir`] locating that file by
//! walking up the filesystem tree.

pub mod config;
pub mod project_dir;

pub use config::{ConfigError, SchemaEngineConfig};
