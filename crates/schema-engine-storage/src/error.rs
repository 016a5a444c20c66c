//! Storage error types, each carrying enough context for a host HTTP layer
//! to map it to a status code (validation -> 400, not-found -> 404,
//! conflict -> 409, integrity -> 409, cycle -> 422).

use schema_engine_core::validation::ValidationError;

/// Errors that can occur during schema repository, DDL, migration, or
/// dependency resolver operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The definition failed structural or cross-cutting validation.
    #[error("invalid definition: {0:?}")]
    InvalidDefinition(Vec<ValidationError>),

    /// `(model_id, version)` already exists.
    #[error("duplicate version: {model_id} {version}")]
    DuplicateVersion { model_id: String, version: String },

    /// The requested entity was not found.
    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },

    /// The record is a system record and therefore immutable/undeletable.
    #[error("schema {0} is a system record and cannot be modified or deleted")]
    ImmutableSystem(i64),

    /// The record is `active` or `deprecated` and therefore immutable; a
    /// change requires a new version.
    #[error("schema {0} is {1} and therefore immutable; create a new version instead")]
    ImmutableActive(i64, String),

    /// An `active` schema cannot be physically deleted.
    #[error("schema {0} is active and cannot be deleted")]
    ActiveNotDeletable(i64),

    /// The schema has live dependents and cannot be deleted.
    #[error("schema {schema_id} has {} dependent(s) and cannot be deleted", dependents.len())]
    HasDependents { schema_id: i64, dependents: Vec<i64> },

    /// The induced subgraph over the given ids is not a DAG.
    #[error("circular dependency among schema ids {0:?}")]
    CircularDependency(Vec<i64>),

    /// An identifier failed the encoder's safety check.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A column type change has no known-safe `USING` cast and the caller
    /// did not supply one.
    #[error("incompatible type change from {from} to {to} with no known USING cast")]
    IncompatibleTypeChange { from: String, to: String },

    /// A migration with this name already exists and is not `pending`.
    #[error("migration name conflict: {0}")]
    MigrationNameConflict(String),

    /// A dependency edge points at a model with no active schema.
    #[error("unresolved dependency: {0}")]
    UnresolvedDependency(String),

    /// The database is locked by another process/connection.
    #[error("database locked: {0}")]
    DatabaseLocked(String),

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A transaction operation failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A storage-schema migration failed during `init_schema`.
    #[error("storage migration {name} failed: {reason}")]
    Migration { name: String, reason: String },

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Raised by the pure encoder/type-mapper layer and propagated as-is.
    #[error("encoding error: {0}")]
    Encoding(#[from] schema_engine_core::encoder::EncodingError),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    // -- Constructors --------------------------------------------------------

    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound { kind: kind.into(), key: key.into() }
    }

    // -- Predicates ------------------------------------------------------------

    /// `true` for [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// `true` for the family of conflict/integrity errors a host maps to
    /// HTTP 409: duplicate version, immutability violations, dependents,
    /// migration name collisions, and active-record delete attempts.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateVersion { .. }
                | Self::ImmutableSystem(_)
                | Self::ImmutableActive(_, _)
                | Self::ActiveNotDeletable(_)
                | Self::HasDependents { .. }
                | Self::MigrationNameConflict(_)
        )
    }

    /// `true` for a broken dependency graph -- a host maps this to HTTP 422.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::CircularDependency(_))
    }

    /// `true` if the operation may succeed on retry without caller
    /// intervention (transient lock/connection contention).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseLocked(_) | Self::Connection(_) | Self::Transaction(_))
    }
}
