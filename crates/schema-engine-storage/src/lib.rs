//! Storage backend for the schema lifecycle engine.
//!
//! Provides the [`SchemaRepository`] trait, implemented here for
//! [`SqliteStore`], plus the pure DDL Generator ([`ddl`]), Migration
//! Generator ([`migration`]) and Dependency Resolver ([`resolver`])
//! modules that sit alongside it.

pub mod ddl;
pub mod error;
pub mod migration;
pub mod resolver;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use sqlite::SqliteStore;
pub use traits::{
    CanDeleteResult, ChangeLogEntry, ChangeLogFilter, DependencyNode, DependencyStatistics,
    GraphValidationReport, MigrationRecord, SchemaEngine, SchemaFilter, SchemaRecord, SchemaRepository,
};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::json;

use schema_engine_core::content_hash::compute_migration_checksum;
use schema_engine_core::definition::SchemaDefinition;
use schema_engine_core::dependency::SchemaDependencyEdge;
use schema_engine_core::enums::{ChangeType, MigrationStatus};

use error::Result;

impl SchemaRepository for SqliteStore {
    fn create(&self, definition: SchemaDefinition, actor: &str) -> Result<SchemaRecord> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let record = sqlite::schemas::insert_on_conn(&tx, &definition, actor, now)?;
        sqlite::dependencies::derive_edges_on_conn(&tx, record.id, &definition)?;
        let entry = sqlite::change_log::append_on_conn(
            &tx,
            record.id,
            ChangeType::Created,
            None,
            Some(&serde_json::to_value(&record.definition)?),
            actor,
            now,
        )?;

        tx.commit()?;
        self.fire_event(&entry);
        Ok(record)
    }

    fn get(&self, id: i64) -> Result<SchemaRecord> {
        let conn = self.lock_conn()?;
        sqlite::schemas::get_on_conn(&conn, id)
    }

    fn get_by_model_version(&self, model_id: &str, version: &str) -> Result<SchemaRecord> {
        let conn = self.lock_conn()?;
        sqlite::schemas::get_by_model_version_on_conn(&conn, model_id, version)
    }

    fn get_active(&self, model_id: &str) -> Result<Option<SchemaRecord>> {
        let conn = self.lock_conn()?;
        sqlite::schemas::get_active_on_conn(&conn, model_id)
    }

    fn list_versions(&self, model_id: &str) -> Result<Vec<SchemaRecord>> {
        let conn = self.lock_conn()?;
        sqlite::schemas::list_versions_on_conn(&conn, model_id)
    }

    fn list_models(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        sqlite::schemas::list_models_on_conn(&conn)
    }

    fn update(&self, id: i64, definition: SchemaDefinition, actor: &str) -> Result<SchemaRecord> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let previous = sqlite::schemas::get_on_conn(&tx, id)?;
        let updated = sqlite::schemas::update_definition_on_conn(&tx, id, &definition, now)?;
        let entry = sqlite::change_log::append_on_conn(
            &tx,
            id,
            ChangeType::Updated,
            Some(&serde_json::to_value(&previous.definition)?),
            Some(&serde_json::to_value(&updated.definition)?),
            actor,
            now,
        )?;

        tx.commit()?;
        self.fire_event(&entry);
        Ok(updated)
    }

    fn activate(&self, id: i64, actor: &str) -> Result<SchemaRecord> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let previous_status = sqlite::schemas::get_on_conn(&tx, id)?.status.to_string();
        let (updated, prior) = sqlite::schemas::activate_on_conn(&tx, id, now)?;
        let mut fired = Vec::new();
        if previous_status != "active" {
            if let Some(prior) = &prior {
                fired.push(sqlite::change_log::append_on_conn(
                    &tx,
                    prior.id,
                    ChangeType::Deprecated,
                    Some(&json!({"status": "active"})),
                    Some(&json!({"status": "deprecated"})),
                    actor,
                    now,
                )?);
            }
            fired.push(sqlite::change_log::append_on_conn(
                &tx,
                id,
                ChangeType::Activated,
                Some(&json!({"status": previous_status})),
                Some(&json!({"status": "active"})),
                actor,
                now,
            )?);
        }

        tx.commit()?;
        for entry in &fired {
            self.fire_event(entry);
        }
        Ok(updated)
    }

    fn deprecate(&self, id: i64, actor: &str) -> Result<SchemaRecord> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let updated = sqlite::schemas::deprecate_on_conn(&tx, id, now)?;
        let entry = sqlite::change_log::append_on_conn(
            &tx,
            id,
            ChangeType::Deprecated,
            Some(&json!({"status": "active"})),
            Some(&json!({"status": "deprecated"})),
            actor,
            now,
        )?;

        tx.commit()?;
        self.fire_event(&entry);
        Ok(updated)
    }

    fn delete(&self, id: i64, actor: &str) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let previous = sqlite::schemas::delete_on_conn(&tx, id)?;
        let entry = sqlite::change_log::append_on_conn(
            &tx,
            id,
            ChangeType::Deleted,
            Some(&serde_json::to_value(&previous.definition)?),
            None,
            actor,
            now,
        )?;

        tx.commit()?;
        self.fire_event(&entry);
        Ok(())
    }

    fn change_log(&self, schema_id: i64) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.lock_conn()?;
        sqlite::change_log::for_schema_on_conn(&conn, schema_id)
    }

    fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.lock_conn()?;
        sqlite::change_log::recent_on_conn(&conn, limit)
    }

    fn list_filtered(&self, filter: &SchemaFilter) -> Result<Vec<SchemaRecord>> {
        let conn = self.lock_conn()?;
        sqlite::schemas::list_filtered_on_conn(&conn, filter)
    }

    fn change_log_filtered(&self, filter: &ChangeLogFilter) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.lock_conn()?;
        sqlite::change_log::list_filtered_on_conn(&conn, filter)
    }
}

/// Operations beyond the core [`SchemaRepository`] trait: DDL emission for
/// a stored record, migration generation/lookup, and the dependency
/// resolver queries, all composed from the repository plus the pure
/// [`ddl`]/[`migration`]/[`resolver`] modules.
impl SqliteStore {
    /// Emits `CREATE TABLE` DDL for a stored schema's definition.
    pub fn emit_ddl(&self, id: i64) -> Result<Vec<String>> {
        let record = self.get(id)?;
        Ok(ddl::emit_create(&record.definition)?)
    }

    /// Generates (and persists) the migration transitioning from
    /// `from_id` (or an initial creation, if `None`) to `to_id`.
    ///
    /// Idempotent by name: if a migration with the computed name already
    /// exists and is not `pending` (and `regenerate` is false), the
    /// existing record is returned unchanged rather than re-generated.
    pub fn generate_migration(
        &self,
        from_id: Option<i64>,
        to_id: i64,
        clock: DateTime<Utc>,
        regenerate: bool,
    ) -> Result<MigrationRecord> {
        let to_record = self.get(to_id)?;
        let from_record = from_id.map(|id| self.get(id)).transpose()?;

        let name = migration::migration_name(
            clock,
            &to_record.model_id,
            from_record.as_ref().map(|r| r.version.as_str()),
            &to_record.version,
        );

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let existing = sqlite::migrations::find_by_name_on_conn(&tx, &name)?;
        if let Some(existing) = &existing {
            if existing.status != MigrationStatus::Pending && !regenerate {
                tx.commit()?;
                return Ok(existing.clone());
            }
        }

        let generated = migration::generate(from_record.as_ref().map(|r| &r.definition), &to_record.definition)?;
        let checksum = compute_migration_checksum(&generated.forward_sql, &generated.rollback_sql);

        let record = match existing {
            Some(existing) => sqlite::migrations::update_sql_on_conn(
                &tx,
                existing.id,
                &generated.forward_sql,
                &generated.rollback_sql,
                generated.is_breaking,
                &checksum,
            )?,
            None => sqlite::migrations::insert_on_conn(
                &tx,
                &name,
                from_id,
                to_id,
                from_record.as_ref().map(|r| r.version.as_str()),
                &to_record.version,
                &generated.forward_sql,
                &generated.rollback_sql,
                generated.is_breaking,
                &checksum,
            )?,
        };
        tx.commit()?;
        Ok(record)
    }

    pub fn get_migration(&self, id: i64) -> Result<MigrationRecord> {
        let conn = self.lock_conn()?;
        sqlite::migrations::get_on_conn(&conn, id)
    }

    pub fn get_migration_by_name(&self, name: &str) -> Result<MigrationRecord> {
        let conn = self.lock_conn()?;
        sqlite::migrations::get_by_name_on_conn(&conn, name)
    }

    pub fn list_migrations(&self) -> Result<Vec<MigrationRecord>> {
        let conn = self.lock_conn()?;
        sqlite::migrations::list_on_conn(&conn)
    }

    /// Records a previously-generated migration as `applied` or
    /// `rolled_back`/`failed` after the host's database driver has run it;
    /// the core itself never executes SQL.
    pub fn mark_migration_status(&self, id: i64, status: MigrationStatus) -> Result<MigrationRecord> {
        let conn = self.lock_conn()?;
        let applied_at = matches!(status, MigrationStatus::Applied).then(Utc::now);
        sqlite::migrations::set_status_on_conn(&conn, id, status, applied_at)
    }

    /// Every dependency edge originating at `id`.
    pub fn dependencies_of(&self, id: i64) -> Result<Vec<SchemaDependencyEdge>> {
        let conn = self.lock_conn()?;
        sqlite::dependencies::from_schema_on_conn(&conn, id)
    }

    /// Direct dependents: every edge pointing at `id`.
    pub fn direct_dependents_of(&self, id: i64) -> Result<Vec<SchemaDependencyEdge>> {
        let conn = self.lock_conn()?;
        sqlite::dependencies::into_schema_on_conn(&conn, id)
    }

    /// BFS outward from `id` over what it depends on, among every stored
    /// schema (not just active ones), capped at `max_depth`.
    pub fn dependency_chain(&self, id: i64, max_depth: u32) -> Result<Vec<DependencyNode>> {
        let edges = self.all_edges()?;
        Ok(resolver::dependency_chain(id, &edges, max_depth)
            .into_iter()
            .map(|n| DependencyNode { schema_id: n.schema_id, depth: n.depth, edge: n.edge })
            .collect())
    }

    /// Reverse traversal: every schema that transitively depends on `id`.
    pub fn dependents(&self, id: i64, max_depth: u32) -> Result<Vec<DependencyNode>> {
        let edges = self.all_edges()?;
        Ok(resolver::dependents(id, &edges, max_depth)
            .into_iter()
            .map(|n| DependencyNode { schema_id: n.schema_id, depth: n.depth, edge: n.edge })
            .collect())
    }

    pub fn can_delete(&self, id: i64) -> Result<CanDeleteResult> {
        let edges = self.all_edges()?;
        let result = resolver::can_delete(id, &edges);
        Ok(CanDeleteResult { ok: result.ok, reason: result.reason, blocking_dependents: result.blocking_dependents })
    }

    /// Topologically orders every currently `active` schema.
    pub fn execution_order(&self) -> Result<Vec<i64>> {
        let conn = self.lock_conn()?;
        let active = sqlite::schemas::list_all_active_on_conn(&conn)?;
        let ids: Vec<i64> = active.iter().map(|r| r.id).collect();
        let tie_break = tie_break_map(&active);
        let edges = sqlite::dependencies::among_on_conn(&conn, &ids)?;
        resolver::execution_order(&ids, &edges, &tie_break)
            .map_err(|e| StorageError::CircularDependency(e.0))
    }

    /// Runs `execution_order` over every `active` schema and reports edges
    /// whose referent is missing or inactive.
    pub fn validate_graph(&self) -> Result<GraphValidationReport> {
        let conn = self.lock_conn()?;
        let active = sqlite::schemas::list_all_active_on_conn(&conn)?;
        let ids: Vec<i64> = active.iter().map(|r| r.id).collect();
        let tie_break = tie_break_map(&active);
        let edges = sqlite::dependencies::among_on_conn(&conn, &ids)?;
        let report = resolver::validate_graph(&ids, &edges, &tie_break)
            .map_err(|e| StorageError::CircularDependency(e.0))?;
        Ok(GraphValidationReport { order: report.order, unresolved_edges: report.unresolved_edges })
    }

    /// Aggregate statistics over the active-schema dependency graph.
    pub fn dependency_statistics(&self) -> Result<DependencyStatistics> {
        let conn = self.lock_conn()?;
        let active = sqlite::schemas::list_all_active_on_conn(&conn)?;
        let ids: Vec<i64> = active.iter().map(|r| r.id).collect();
        let model_id_of = tie_break_map(&active);
        let edges = sqlite::dependencies::among_on_conn(&conn, &ids)?;
        let stats = resolver::statistics(&ids, &edges, &model_id_of);
        Ok(DependencyStatistics {
            total_schemas: stats.total_schemas,
            total_edges: stats.total_edges,
            average_out_degree: stats.average_out_degree,
            average_in_degree: stats.average_in_degree,
            most_dependent: stats.most_dependent,
            most_depended_on: stats.most_depended_on,
        })
    }

    /// Every dependency edge in the store, regardless of schema status --
    /// the basis for [`dependency_chain`](Self::dependency_chain)/
    /// [`dependents`](Self::dependents)/[`can_delete`](Self::can_delete),
    /// which must also see edges from/into draft and deprecated records.
    fn all_edges(&self) -> Result<Vec<SchemaDependencyEdge>> {
        let conn = self.lock_conn()?;
        let all_ids: Vec<i64> = {
            let mut stmt = conn.prepare("SELECT id FROM schemas")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        sqlite::dependencies::among_on_conn(&conn, &all_ids)
    }
}

impl SchemaEngine for SqliteStore {
    fn emit_ddl(&self, id: i64) -> Result<Vec<String>> {
        SqliteStore::emit_ddl(self, id)
    }

    fn generate_migration(
        &self,
        from_id: Option<i64>,
        to_id: i64,
        clock: DateTime<Utc>,
        regenerate: bool,
    ) -> Result<MigrationRecord> {
        SqliteStore::generate_migration(self, from_id, to_id, clock, regenerate)
    }

    fn get_migration(&self, id: i64) -> Result<MigrationRecord> {
        SqliteStore::get_migration(self, id)
    }

    fn get_migration_by_name(&self, name: &str) -> Result<MigrationRecord> {
        SqliteStore::get_migration_by_name(self, name)
    }

    fn list_migrations(&self) -> Result<Vec<MigrationRecord>> {
        SqliteStore::list_migrations(self)
    }

    fn mark_migration_status(&self, id: i64, status: MigrationStatus) -> Result<MigrationRecord> {
        SqliteStore::mark_migration_status(self, id, status)
    }

    fn dependencies_of(&self, id: i64) -> Result<Vec<SchemaDependencyEdge>> {
        SqliteStore::dependencies_of(self, id)
    }

    fn direct_dependents_of(&self, id: i64) -> Result<Vec<SchemaDependencyEdge>> {
        SqliteStore::direct_dependents_of(self, id)
    }

    fn dependency_chain(&self, id: i64, max_depth: u32) -> Result<Vec<DependencyNode>> {
        SqliteStore::dependency_chain(self, id, max_depth)
    }

    fn dependents(&self, id: i64, max_depth: u32) -> Result<Vec<DependencyNode>> {
        SqliteStore::dependents(self, id, max_depth)
    }

    fn can_delete(&self, id: i64) -> Result<CanDeleteResult> {
        SqliteStore::can_delete(self, id)
    }

    fn execution_order(&self) -> Result<Vec<i64>> {
        SqliteStore::execution_order(self)
    }

    fn validate_graph(&self) -> Result<GraphValidationReport> {
        SqliteStore::validate_graph(self)
    }

    fn dependency_statistics(&self) -> Result<DependencyStatistics> {
        SqliteStore::dependency_statistics(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_engine_core::definition::META_SCHEMA_ID;

    fn def(model_id: &str, version: &str, table: &str) -> SchemaDefinition {
        let json = format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "{model_id}",
                "version": "{version}",
                "table": "{table}",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}}
                }}
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn full_lifecycle_create_activate_deprecate_delete() {
        let store = SqliteStore::open_in_memory().unwrap();

        let v1 = store.create(def("User", "1.0.0", "users"), "alice").unwrap();
        assert_eq!(v1.status, schema_engine_core::enums::SchemaStatus::Draft);

        let v1 = store.activate(v1.id, "alice").unwrap();
        assert_eq!(v1.status, schema_engine_core::enums::SchemaStatus::Active);

        let err = store.update(v1.id, def("User", "1.0.0", "users"), "alice").unwrap_err();
        assert!(matches!(err, StorageError::ImmutableActive(_, _)));

        let v1 = store.deprecate(v1.id, "alice").unwrap();
        assert_eq!(v1.status, schema_engine_core::enums::SchemaStatus::Deprecated);

        store.delete(v1.id, "alice").unwrap();
        assert!(store.get(v1.id).is_err());

        let log = store.recent_changes(10).unwrap();
        let kinds: Vec<_> = log.iter().map(|e| e.change_type).collect();
        assert!(kinds.contains(&ChangeType::Created));
        assert!(kinds.contains(&ChangeType::Activated));
        assert!(kinds.contains(&ChangeType::Deprecated));
        assert!(kinds.contains(&ChangeType::Deleted));
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create(def("User", "1.0.0", "users"), "alice").unwrap();
        let err = store.create(def("User", "1.0.0", "users"), "alice").unwrap_err();
        assert!(matches!(err, StorageError::DuplicateVersion { .. }));
    }

    #[test]
    fn activating_new_version_deprecates_prior_active() {
        let store = SqliteStore::open_in_memory().unwrap();
        let v1 = store.create(def("User", "1.0.0", "users"), "alice").unwrap();
        store.activate(v1.id, "alice").unwrap();
        let v2 = store.create(def("User", "1.1.0", "users"), "alice").unwrap();
        store.activate(v2.id, "alice").unwrap();

        assert_eq!(store.get(v1.id).unwrap().status, schema_engine_core::enums::SchemaStatus::Deprecated);
        assert_eq!(store.get_active("User").unwrap().unwrap().id, v2.id);
    }

    #[test]
    fn emit_ddl_for_stored_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        let v1 = store.create(def("User", "1.0.0", "users"), "alice").unwrap();
        let stmts = store.emit_ddl(v1.id).unwrap();
        assert!(stmts[0].contains("CREATE TABLE \"users\""));
    }

    #[test]
    fn generate_migration_is_idempotent_by_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let v1 = store.create(def("User", "1.0.0", "users"), "alice").unwrap();
        let clock = Utc::now();

        let m1 = store.generate_migration(None, v1.id, clock, false).unwrap();
        let m2 = store.generate_migration(None, v1.id, clock, false).unwrap();
        assert_eq!(m1.id, m2.id);
        assert_eq!(m1.name, m2.name);
    }

    #[test]
    fn dependency_facade_reports_foreign_key_edge() {
        let store = SqliteStore::open_in_memory().unwrap();
        let owner = store.create(def("User", "1.0.0", "users"), "alice").unwrap();
        store.activate(owner.id, "alice").unwrap();

        let post_json = format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "Post",
                "version": "1.0.0",
                "table": "posts",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "author_id": {{"type": "integer", "database": {{
                        "foreignKey": {{"table": "User", "column": "id"}}
                    }}}}
                }}
            }}"#
        );
        let post_def: SchemaDefinition = serde_json::from_str(&post_json).unwrap();
        let post = store.create(post_def, "alice").unwrap();

        let deps = store.dependencies_of(post.id).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].to_schema_id, Some(owner.id));

        let can_delete = store.can_delete(owner.id).unwrap();
        assert!(!can_delete.ok);
        assert_eq!(can_delete.blocking_dependents, vec![post.id]);
    }

    #[test]
    fn event_hook_fires_on_every_mutation() {
        use std::sync::{Arc, Mutex as StdMutex};

        let seen: Arc<StdMutex<Vec<ChangeType>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let store = SqliteStore::open_in_memory()
            .unwrap()
            .with_event_hook(move |entry| seen_clone.lock().unwrap().push(entry.change_type));

        let v1 = store.create(def("User", "1.0.0", "users"), "alice").unwrap();
        store.activate(v1.id, "alice").unwrap();
        store.deprecate(v1.id, "alice").unwrap();
        store.delete(v1.id, "alice").unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeType::Created, ChangeType::Activated, ChangeType::Deprecated, ChangeType::Deleted]
        );
    }

    #[test]
    fn schema_engine_trait_object_exposes_full_surface() {
        let store = SqliteStore::open_in_memory().unwrap();
        let engine: &dyn SchemaEngine = &store;

        let v1 = engine.create(def("User", "1.0.0", "users"), "alice").unwrap();
        engine.activate(v1.id, "alice").unwrap();
        let stmts = engine.emit_ddl(v1.id).unwrap();
        assert!(stmts[0].contains("CREATE TABLE \"users\""));
        assert_eq!(engine.execution_order().unwrap(), vec![v1.id]);
    }

    #[test]
    fn list_filtered_by_status_and_change_log_filtered_by_type() {
        let store = SqliteStore::open_in_memory().unwrap();
        let v1 = store.create(def("User", "1.0.0", "users"), "alice").unwrap();
        store.activate(v1.id, "alice").unwrap();
        store.create(def("Post", "1.0.0", "posts"), "alice").unwrap();

        let active = store
            .list_filtered(&SchemaFilter { status: Some(schema_engine_core::enums::SchemaStatus::Active), ..Default::default() })
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].model_id, "User");

        let activations = store
            .change_log_filtered(&ChangeLogFilter { change_type: Some(ChangeType::Activated), ..Default::default() })
            .unwrap();
        assert_eq!(activations.len(), 1);
        assert_eq!(activations[0].schema_id, v1.id);
    }
}

fn tie_break_map(records: &[SchemaRecord]) -> HashMap<i64, String> {
    records.iter().map(|r| (r.id, r.model_id.clone())).collect()
}
