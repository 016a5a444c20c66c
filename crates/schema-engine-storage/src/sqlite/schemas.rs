//! `schemas` table CRUD -- the Schema Repository's persistence layer.
//!
//! Every mutating function here takes an already-open [`rusqlite::Transaction`]
//! so that [`super::store::SqliteStore`]'s `*_impl` methods can compose a
//! create-plus-derive-edges-plus-append-change-log sequence atomically; see
//! `crate::lib`'s `SchemaRepository` implementation for the transaction
//! boundary itself.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use schema_engine_core::definition::SchemaDefinition;
use schema_engine_core::enums::SchemaStatus;
use schema_engine_core::validation::validate;

use crate::error::{Result, StorageError};
use crate::traits::{SchemaFilter, SchemaRecord};

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SchemaRecord> {
    let definition_json: String = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    let definition: SchemaDefinition = serde_json::from_str(&definition_json)
        .unwrap_or_else(|e| panic!("stored definition failed to deserialize: {e}"));
    Ok(SchemaRecord {
        id: row.get(0)?,
        model_id: row.get(1)?,
        version: row.get(2)?,
        name: row.get(3)?,
        table_name: row.get(10)?,
        definition,
        status: status.parse().unwrap_or(SchemaStatus::Draft),
        is_system: row.get::<_, i64>(6)? != 0,
        created_by: row.get(7)?,
        created_at: super::parse_datetime(&created_at),
        updated_at: super::parse_datetime(&updated_at),
    })
}

const SELECT_COLUMNS: &str =
    "id, model_id, version, name, definition, status, is_system, created_by, created_at, updated_at, table_name";

pub(crate) fn exists_version_on_conn(conn: &Connection, model_id: &str, version: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM schemas WHERE model_id = ?1 AND version = ?2",
        params![model_id, version],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_on_conn(
    conn: &Connection,
    definition: &SchemaDefinition,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<SchemaRecord> {
    let report = validate(definition);
    if !report.ok() {
        return Err(StorageError::InvalidDefinition(report.errors));
    }
    if exists_version_on_conn(conn, &definition.model_id, &definition.version)? {
        return Err(StorageError::DuplicateVersion {
            model_id: definition.model_id.clone(),
            version: definition.version.clone(),
        });
    }

    let definition_json = serde_json::to_string(definition)?;
    let now_str = now.to_rfc3339();
    conn.execute(
        "INSERT INTO schemas
            (model_id, version, name, table_name, definition, status, is_system, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'draft', 0, ?6, ?7, ?7)",
        params![
            definition.model_id,
            definition.version,
            definition.name,
            definition.table,
            definition_json,
            actor,
            now_str,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_on_conn(conn, id)
}

pub(crate) fn get_on_conn(conn: &Connection, id: i64) -> Result<SchemaRecord> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM schemas WHERE id = ?1"),
        params![id],
        row_to_record,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("schema", id.to_string()),
        other => other.into(),
    })
}

pub(crate) fn get_by_model_version_on_conn(
    conn: &Connection,
    model_id: &str,
    version: &str,
) -> Result<SchemaRecord> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM schemas WHERE model_id = ?1 AND version = ?2"),
        params![model_id, version],
        row_to_record,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            StorageError::not_found("schema", format!("{model_id}@{version}"))
        }
        other => other.into(),
    })
}

pub(crate) fn get_active_on_conn(conn: &Connection, model_id: &str) -> Result<Option<SchemaRecord>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM schemas WHERE model_id = ?1 AND status = 'active'"),
        params![model_id],
        row_to_record,
    )
    .optional()
    .map_err(Into::into)
}

pub(crate) fn list_versions_on_conn(conn: &Connection, model_id: &str) -> Result<Vec<SchemaRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM schemas WHERE model_id = ?1 ORDER BY created_at DESC, id DESC"
    ))?;
    let rows = stmt.query_map(params![model_id], row_to_record)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn list_models_on_conn(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT model_id FROM schemas ORDER BY model_id ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn list_all_active_on_conn(conn: &Connection) -> Result<Vec<SchemaRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM schemas WHERE status = 'active' ORDER BY model_id ASC"
    ))?;
    let rows = stmt.query_map([], row_to_record)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

/// Dynamic-`WHERE` listing over [`SchemaFilter`]: one `where_clauses` entry
/// and one bound parameter per populated filter field.
pub(crate) fn list_filtered_on_conn(conn: &Connection, filter: &SchemaFilter) -> Result<Vec<SchemaRecord>> {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut param_idx: usize = 1;

    if let Some(model_id) = &filter.model_id {
        where_clauses.push(format!("model_id = ?{param_idx}"));
        param_values.push(Box::new(model_id.clone()));
        param_idx += 1;
    }
    if let Some(status) = &filter.status {
        where_clauses.push(format!("status = ?{param_idx}"));
        param_values.push(Box::new(status.to_string()));
        param_idx += 1;
    }
    if let Some(is_system) = filter.is_system {
        where_clauses.push(format!("is_system = ?{param_idx}"));
        param_values.push(Box::new(is_system as i64));
        param_idx += 1;
    }
    if let Some(name_contains) = &filter.name_contains {
        where_clauses.push(format!("name LIKE ?{param_idx}"));
        param_values.push(Box::new(format!("%{name_contains}%")));
        param_idx += 1;
    }
    if let Some(created_after) = filter.created_after {
        where_clauses.push(format!("created_at >= ?{param_idx}"));
        param_values.push(Box::new(created_after.to_rfc3339()));
        param_idx += 1;
    }
    if let Some(created_before) = filter.created_before {
        where_clauses.push(format!("created_at <= ?{param_idx}"));
        param_values.push(Box::new(created_before.to_rfc3339()));
        param_idx += 1;
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };
    let sql = format!("SELECT {SELECT_COLUMNS} FROM schemas {where_sql} ORDER BY created_at DESC, id DESC");

    let param_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), row_to_record)?;
    let _ = param_idx;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn update_definition_on_conn(
    conn: &Connection,
    id: i64,
    definition: &SchemaDefinition,
    now: DateTime<Utc>,
) -> Result<SchemaRecord> {
    let record = get_on_conn(conn, id)?;
    if record.is_system {
        return Err(StorageError::ImmutableSystem(id));
    }
    if record.status != SchemaStatus::Draft {
        return Err(StorageError::ImmutableActive(id, record.status.to_string()));
    }
    let report = validate(definition);
    if !report.ok() {
        return Err(StorageError::InvalidDefinition(report.errors));
    }

    let definition_json = serde_json::to_string(definition)?;
    conn.execute(
        "UPDATE schemas SET name = ?1, table_name = ?2, definition = ?3, updated_at = ?4 WHERE id = ?5",
        params![definition.name, definition.table, definition_json, now.to_rfc3339(), id],
    )?;
    get_on_conn(conn, id)
}

/// Promotes `id` to `active`, returning the schema still in its prior
/// active slot for the same `model_id` (if any), so the caller can demote
/// it and append the matching change log entries. A no-op returns `None`
/// for both and leaves `id` untouched.
pub(crate) fn activate_on_conn(
    conn: &Connection,
    id: i64,
    now: DateTime<Utc>,
) -> Result<(SchemaRecord, Option<SchemaRecord>)> {
    let record = get_on_conn(conn, id)?;
    if record.status == SchemaStatus::Active {
        return Ok((record, None));
    }

    let prior = get_active_on_conn(conn, &record.model_id)?;
    if let Some(prior) = &prior {
        conn.execute(
            "UPDATE schemas SET status = 'deprecated', updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), prior.id],
        )?;
    }
    conn.execute(
        "UPDATE schemas SET status = 'active', updated_at = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), id],
    )?;
    let updated = get_on_conn(conn, id)?;
    let prior = match prior {
        Some(p) => Some(get_on_conn(conn, p.id)?),
        None => None,
    };
    Ok((updated, prior))
}

pub(crate) fn deprecate_on_conn(conn: &Connection, id: i64, now: DateTime<Utc>) -> Result<SchemaRecord> {
    let record = get_on_conn(conn, id)?;
    if record.is_system {
        return Err(StorageError::ImmutableSystem(id));
    }
    if record.status != SchemaStatus::Active {
        return Err(StorageError::ImmutableActive(id, record.status.to_string()));
    }
    conn.execute(
        "UPDATE schemas SET status = 'deprecated', updated_at = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), id],
    )?;
    get_on_conn(conn, id)
}

pub(crate) fn delete_on_conn(conn: &Connection, id: i64) -> Result<SchemaRecord> {
    let record = get_on_conn(conn, id)?;
    if record.is_system {
        return Err(StorageError::ImmutableSystem(id));
    }
    if record.status == SchemaStatus::Active {
        return Err(StorageError::ActiveNotDeletable(id));
    }
    if super::dependencies::has_dependents_on_conn(conn, id)? {
        let dependents = super::dependencies::into_schema_on_conn(conn, id)?
            .into_iter()
            .map(|e| e.from_schema_id)
            .collect();
        return Err(StorageError::HasDependents { schema_id: id, dependents });
    }
    conn.execute("DELETE FROM schemas WHERE id = ?1", params![id])?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use schema_engine_core::definition::META_SCHEMA_ID;
    use chrono::TimeZone;

    fn def(model_id: &str, version: &str) -> SchemaDefinition {
        let json = format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "{model_id}",
                "name": "{model_id}",
                "version": "{version}",
                "table": "{}",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}}
                }}
            }}"#,
            model_id.to_ascii_lowercase()
        );
        serde_json::from_str(&json).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let record = insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();
        assert_eq!(record.model_id, "User");
        assert_eq!(record.status, SchemaStatus::Draft);
        let fetched = get_on_conn(&conn, record.id).unwrap();
        assert_eq!(fetched.version, "1.0.0");
    }

    #[test]
    fn duplicate_version_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();
        let err = insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateVersion { .. }));
    }

    #[test]
    fn activate_demotes_prior_active() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let v1 = insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();
        let v2 = insert_on_conn(&conn, &def("User", "1.1.0"), "alice", now()).unwrap();
        activate_on_conn(&conn, v1.id, now()).unwrap();
        let (_, prior) = activate_on_conn(&conn, v2.id, now()).unwrap();
        assert!(prior.is_some());
        assert_eq!(get_on_conn(&conn, v1.id).unwrap().status, SchemaStatus::Deprecated);
        assert_eq!(get_on_conn(&conn, v2.id).unwrap().status, SchemaStatus::Active);
    }

    #[test]
    fn activate_already_active_is_noop() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let v1 = insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();
        activate_on_conn(&conn, v1.id, now()).unwrap();
        let (record, prior) = activate_on_conn(&conn, v1.id, now()).unwrap();
        assert!(prior.is_none());
        assert_eq!(record.status, SchemaStatus::Active);
    }

    #[test]
    fn delete_refuses_active() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let v1 = insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();
        activate_on_conn(&conn, v1.id, now()).unwrap();
        let err = delete_on_conn(&conn, v1.id).unwrap_err();
        assert!(matches!(err, StorageError::ActiveNotDeletable(_)));
    }

    #[test]
    fn delete_draft_ok() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let v1 = insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();
        delete_on_conn(&conn, v1.id).unwrap();
        assert!(get_on_conn(&conn, v1.id).is_err());
    }

    #[test]
    fn list_filtered_by_model_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();
        insert_on_conn(&conn, &def("Post", "1.0.0"), "alice", now()).unwrap();

        let filter = SchemaFilter { model_id: Some("Post".to_string()), ..Default::default() };
        let results = list_filtered_on_conn(&conn, &filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].model_id, "Post");
    }

    #[test]
    fn list_filtered_by_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let v1 = insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();
        insert_on_conn(&conn, &def("Post", "1.0.0"), "alice", now()).unwrap();
        activate_on_conn(&conn, v1.id, now()).unwrap();

        let filter = SchemaFilter { status: Some(SchemaStatus::Active), ..Default::default() };
        let results = list_filtered_on_conn(&conn, &filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].model_id, "User");
    }

    #[test]
    fn list_filtered_name_contains_is_case_sensitive_substring() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        insert_on_conn(&conn, &def("User", "1.0.0"), "alice", now()).unwrap();

        let filter = SchemaFilter { name_contains: Some("Use".to_string()), ..Default::default() };
        assert_eq!(list_filtered_on_conn(&conn, &filter).unwrap().len(), 1);

        let filter = SchemaFilter { name_contains: Some("Nope".to_string()), ..Default::default() };
        assert!(list_filtered_on_conn(&conn, &filter).unwrap().is_empty());
    }
}
