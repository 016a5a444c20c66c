//! Persistent entity types and the `SchemaRepository` trait -- the public
//! API consumers depend on rather than on [`crate::sqlite::SqliteStore`]
//! directly, so that an alternative backend (mock, proxy, a different
//! driver) can be substituted in tests or in a future host.

use chrono::{DateTime, Utc};
use serde_json::Value;

use schema_engine_core::definition::SchemaDefinition;
use schema_engine_core::dependency::SchemaDependencyEdge;
use schema_engine_core::enums::{ChangeType, MigrationStatus, SchemaStatus};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Persistent entities
// ---------------------------------------------------------------------------

/// A stored, versioned schema. `(model_id, version)` is unique; at most one
/// `active` record exists per `model_id`. `is_system` records are immutable
/// and undeletable regardless of status.
#[derive(Debug, Clone)]
pub struct SchemaRecord {
    pub id: i64,
    pub model_id: String,
    pub version: String,
    pub name: String,
    pub table_name: String,
    pub definition: SchemaDefinition,
    pub status: SchemaStatus,
    pub is_system: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named, persisted pair of forward/rollback SQL scripts between two
/// schema versions.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub id: i64,
    pub name: String,
    pub from_schema_id: Option<i64>,
    pub to_schema_id: i64,
    pub from_version: Option<String>,
    pub to_version: String,
    pub forward_sql: String,
    pub rollback_sql: String,
    pub is_breaking: bool,
    pub status: MigrationStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub checksum: String,
}

/// A single append-only audit entry recording a schema mutation.
#[derive(Debug, Clone)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub schema_id: i64,
    pub change_type: ChangeType,
    pub previous_state: Option<Value>,
    pub new_state: Option<Value>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// The reason a schema cannot currently be deleted, returned by
/// `can_delete` alongside the blocking dependents.
#[derive(Debug, Clone)]
pub struct CanDeleteResult {
    pub ok: bool,
    pub reason: Option<String>,
    pub blocking_dependents: Vec<i64>,
}

/// A single node in a [`crate::resolver::DependencyResolver::dependency_chain`]
/// or `dependents` traversal, carrying the edge that reached it.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub schema_id: i64,
    pub depth: u32,
    pub edge: SchemaDependencyEdge,
}

/// The report produced by `validate_graph`: every active schema's execution
/// order (if the graph is acyclic) plus any edges whose referent is
/// missing or not currently active.
#[derive(Debug, Clone, Default)]
pub struct GraphValidationReport {
    pub order: Vec<i64>,
    pub unresolved_edges: Vec<SchemaDependencyEdge>,
}

/// Aggregate statistics over the dependency graph of `active` schemas.
#[derive(Debug, Clone, Default)]
pub struct DependencyStatistics {
    pub total_schemas: usize,
    pub total_edges: usize,
    pub average_out_degree: f64,
    pub average_in_degree: f64,
    /// `(schema_id, model_id, out_degree)`, the schema(s) depending on the
    /// most others, ties broken by `model_id` ascending.
    pub most_dependent: Option<(i64, String, usize)>,
    /// `(schema_id, model_id, in_degree)`, the schema(s) depended on by the
    /// most others, ties broken by `model_id` ascending.
    pub most_depended_on: Option<(i64, String, usize)>,
}

// ---------------------------------------------------------------------------
// Query surface
// ---------------------------------------------------------------------------

/// Dynamic filter over [`list_filtered`](SchemaRepository::list_filtered):
/// every field left `None` is simply omitted from the generated `WHERE`
/// clause.
#[derive(Debug, Clone, Default)]
pub struct SchemaFilter {
    pub model_id: Option<String>,
    pub status: Option<SchemaStatus>,
    pub is_system: Option<bool>,
    pub name_contains: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Dynamic filter over [`change_log_filtered`](SchemaRepository::change_log_filtered).
#[derive(Debug, Clone, Default)]
pub struct ChangeLogFilter {
    pub schema_id: Option<i64>,
    pub change_type: Option<ChangeType>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// SchemaRepository trait
// ---------------------------------------------------------------------------

/// The Schema Repository: create/read/update/activate/deprecate/delete over
/// [`SchemaRecord`], plus the append-only change log. Every mutation is
/// guarded by the lifecycle invariants (one `active` record per `model_id`,
/// immutable `active`/`is_system` records, no delete while dependents exist)
/// and appends a [`ChangeLogEntry`].
pub trait SchemaRepository: Send + Sync {
    /// Validates `definition`, inserts a `draft` [`SchemaRecord`], derives
    /// and persists its dependency edges (one `foreign_key` edge per field
    /// with `database.foreignKey`, one `reference` edge per
    /// `relationship.model`), and appends a `created` change log entry.
    ///
    /// Fails with [`crate::error::StorageError::InvalidDefinition`] if
    /// validation fails, or [`crate::error::StorageError::DuplicateVersion`]
    /// if `(model_id, version)` already exists.
    fn create(&self, definition: SchemaDefinition, actor: &str) -> Result<SchemaRecord>;

    fn get(&self, id: i64) -> Result<SchemaRecord>;

    fn get_by_model_version(&self, model_id: &str, version: &str) -> Result<SchemaRecord>;

    /// Returns the current `active` record for `model_id`, if any.
    fn get_active(&self, model_id: &str) -> Result<Option<SchemaRecord>>;

    /// Lists every version of `model_id`, newest first.
    fn list_versions(&self, model_id: &str) -> Result<Vec<SchemaRecord>>;

    /// Lists every distinct `model_id` with at least one stored schema.
    fn list_models(&self) -> Result<Vec<String>>;

    /// Replaces the definition of a `draft` record in place (no new
    /// version). Fails with `ImmutableActive`/`ImmutableSystem` if the
    /// record is not a mutable draft.
    fn update(&self, id: i64, definition: SchemaDefinition, actor: &str) -> Result<SchemaRecord>;

    /// Promotes `id` to `active`, atomically demoting any other `active`
    /// record for the same `model_id` to `deprecated`. A no-op (returns the
    /// record unchanged) if `id` is already `active`.
    fn activate(&self, id: i64, actor: &str) -> Result<SchemaRecord>;

    /// Demotes an `active` record to `deprecated`.
    fn deprecate(&self, id: i64, actor: &str) -> Result<SchemaRecord>;

    /// Physically deletes a `draft` or `deprecated` record. Refuses on
    /// `active` ([`crate::error::StorageError::ActiveNotDeletable`]), on
    /// `is_system` ([`crate::error::StorageError::ImmutableSystem`]), and if
    /// any edge still points at the record
    /// ([`crate::error::StorageError::HasDependents`]).
    fn delete(&self, id: i64, actor: &str) -> Result<()>;

    /// Returns the change log entries for `schema_id`, oldest first.
    fn change_log(&self, schema_id: i64) -> Result<Vec<ChangeLogEntry>>;

    /// Returns the `limit` most recent change log entries across every
    /// schema, newest first.
    fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeLogEntry>>;

    /// Lists schemas matching every `Some` field of `filter`, newest first.
    fn list_filtered(&self, filter: &SchemaFilter) -> Result<Vec<SchemaRecord>>;

    /// Reads change log entries matching every `Some` field of `filter`,
    /// newest first, capped at `filter.limit` if set.
    fn change_log_filtered(&self, filter: &ChangeLogFilter) -> Result<Vec<ChangeLogEntry>>;
}

// ---------------------------------------------------------------------------
// SchemaEngine: the full consumer-facing operation surface
// ---------------------------------------------------------------------------

/// The operation surface a host process (the HTTP layer, a CLI, a test
/// harness) depends on: everything [`SchemaRepository`] offers plus DDL
/// emission, migration generation/lookup, and the dependency resolver
/// queries. Callers hold a `dyn SchemaEngine` rather than naming the
/// concrete backend.
pub trait SchemaEngine: SchemaRepository {
    /// Emits `CREATE TABLE` DDL for a stored schema's definition.
    fn emit_ddl(&self, id: i64) -> Result<Vec<String>>;

    /// Generates (and persists) the migration transitioning from
    /// `from_id` (or an initial creation, if `None`) to `to_id`.
    fn generate_migration(
        &self,
        from_id: Option<i64>,
        to_id: i64,
        clock: DateTime<Utc>,
        regenerate: bool,
    ) -> Result<MigrationRecord>;

    fn get_migration(&self, id: i64) -> Result<MigrationRecord>;

    fn get_migration_by_name(&self, name: &str) -> Result<MigrationRecord>;

    fn list_migrations(&self) -> Result<Vec<MigrationRecord>>;

    /// Records a previously-generated migration's outcome once the host's
    /// database driver has executed it.
    fn mark_migration_status(&self, id: i64, status: MigrationStatus) -> Result<MigrationRecord>;

    /// Every dependency edge originating at `id`.
    fn dependencies_of(&self, id: i64) -> Result<Vec<SchemaDependencyEdge>>;

    /// Direct dependents: every edge pointing at `id`.
    fn direct_dependents_of(&self, id: i64) -> Result<Vec<SchemaDependencyEdge>>;

    /// BFS outward from `id` over what it depends on.
    fn dependency_chain(&self, id: i64, max_depth: u32) -> Result<Vec<DependencyNode>>;

    /// Reverse traversal: every schema that transitively depends on `id`.
    fn dependents(&self, id: i64, max_depth: u32) -> Result<Vec<DependencyNode>>;

    fn can_delete(&self, id: i64) -> Result<CanDeleteResult>;

    /// Topologically orders every currently `active` schema.
    fn execution_order(&self) -> Result<Vec<i64>>;

    /// Runs `execution_order` over every `active` schema and reports edges
    /// whose referent is missing or inactive.
    fn validate_graph(&self) -> Result<GraphValidationReport>;

    /// Aggregate statistics over the active-schema dependency graph.
    fn dependency_statistics(&self) -> Result<DependencyStatistics>;
}
