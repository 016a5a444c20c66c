//! Table definitions and migration history for [`super::store::SqliteStore`].

/// Bump this whenever `SCHEMA_STATEMENTS` changes in a way existing
/// databases need to be migrated for; add the migration to `MIGRATIONS`
/// rather than editing a statement that already shipped.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The full set of tables and indexes, per the persistence contract:
/// `(model_id, version)` unique on `schemas`;
/// `(model_id)` partial-unique where `status = 'active'`; `(from_schema_id)`
/// and `(to_schema_id)` on `schema_dependency_edges`; `(name)` unique on
/// `migrations`; `(schema_id, occurred_at)` on `change_log`.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schemas (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        model_id        TEXT NOT NULL,
        version         TEXT NOT NULL,
        name            TEXT NOT NULL,
        table_name      TEXT NOT NULL,
        definition      TEXT NOT NULL,
        status          TEXT NOT NULL DEFAULT 'draft',
        is_system       INTEGER NOT NULL DEFAULT 0,
        created_by      TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_schemas_model_version
        ON schemas (model_id, version);",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_schemas_model_active
        ON schemas (model_id) WHERE status = 'active';",
    "CREATE TABLE IF NOT EXISTS schema_dependency_edges (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        from_schema_id  INTEGER NOT NULL REFERENCES schemas(id) ON DELETE CASCADE,
        to_schema_id    INTEGER REFERENCES schemas(id) ON DELETE SET NULL,
        to_model_id     TEXT NOT NULL,
        dependency_type TEXT NOT NULL,
        field_name      TEXT,
        config          TEXT
    );",
    "CREATE INDEX IF NOT EXISTS idx_edges_from_schema
        ON schema_dependency_edges (from_schema_id);",
    "CREATE INDEX IF NOT EXISTS idx_edges_to_schema
        ON schema_dependency_edges (to_schema_id);",
    "CREATE TABLE IF NOT EXISTS migrations (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL,
        from_schema_id  INTEGER REFERENCES schemas(id),
        to_schema_id    INTEGER NOT NULL REFERENCES schemas(id),
        from_version    TEXT,
        to_version      TEXT NOT NULL,
        forward_sql     TEXT NOT NULL,
        rollback_sql    TEXT NOT NULL,
        is_breaking     INTEGER NOT NULL DEFAULT 0,
        status          TEXT NOT NULL DEFAULT 'pending',
        applied_at      TEXT,
        checksum        TEXT NOT NULL
    );",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_migrations_name
        ON migrations (name);",
    "CREATE TABLE IF NOT EXISTS change_log (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        schema_id       INTEGER NOT NULL,
        change_type     TEXT NOT NULL,
        previous_state  TEXT,
        new_state       TEXT,
        actor           TEXT NOT NULL,
        occurred_at     TEXT NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_change_log_schema_occurred
        ON change_log (schema_id, occurred_at);",
    "CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS metadata (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );",
];

/// Seed values inserted (idempotently, `INSERT OR IGNORE`) on first init.
pub const DEFAULT_CONFIG: &[(&str, &str)] = &[
    ("dependency_max_depth", "10"),
    ("meta_schema_dialect", "https://forge.internal/schemas/forge-model/v1"),
];

/// `(name, sql)` pairs applied once, in order, tracked via
/// `metadata` keys of the form `migration:<name>`. Empty until the shipped
/// schema needs its first change.
pub const MIGRATIONS: &[(&str, &str)] = &[];
