//! `schema_dependency_edges` CRUD and derivation.
//!
//! An edge is derived, not declared: [`derive_edges_on_conn`] walks a
//! definition's fields looking for `database.foreignKey` and
//! `relationship` and inserts one row per hit, resolving `to_schema_id`
//! against whichever schema is currently `active` for the referenced
//! model (left `NULL` -- an unsatisfied edge -- if none is).

use rusqlite::{params, Connection, Row};
use serde_json::Value;

use schema_engine_core::definition::SchemaDefinition;
use schema_engine_core::dependency::SchemaDependencyEdge;
use schema_engine_core::enums::DependencyType;

use crate::error::Result;

/// Looks up the `id` of the current `active` schema for `model_id`, if any.
/// Foreign keys are declared against a SQL table name; this repository
/// resolves that name directly against `model_id` -- the latest active
/// schema with that model id.
pub(crate) fn active_schema_id_for_model(conn: &Connection, model_id: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM schemas WHERE model_id = ?1 AND status = 'active'",
            params![model_id],
            |row| row.get(0),
        )
        .ok();
    Ok(id)
}

fn insert_edge_on_conn(
    conn: &Connection,
    from_schema_id: i64,
    to_schema_id: Option<i64>,
    to_model_id: &str,
    dependency_type: DependencyType,
    field_name: Option<&str>,
    config: Option<&Value>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_dependency_edges
            (from_schema_id, to_schema_id, to_model_id, dependency_type, field_name, config)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            from_schema_id,
            to_schema_id,
            to_model_id,
            dependency_type.as_str(),
            field_name,
            config.map(|v| v.to_string()),
        ],
    )?;
    Ok(())
}

/// Derives and inserts the dependency edges for a newly created schema
/// record: one `foreign_key` edge per field with `database.foreignKey`,
/// one `reference` edge per field with `relationship.model`.
pub(crate) fn derive_edges_on_conn(
    conn: &Connection,
    from_schema_id: i64,
    def: &SchemaDefinition,
) -> Result<()> {
    for (field_name, field) in def.fields_in_order() {
        if let Some(db) = &field.database {
            if let Some(fk) = &db.foreign_key {
                let to_schema_id = active_schema_id_for_model(conn, &fk.table)?;
                insert_edge_on_conn(
                    conn,
                    from_schema_id,
                    to_schema_id,
                    &fk.table,
                    DependencyType::ForeignKey,
                    Some(field_name),
                    None,
                )?;
            }
        }
        if let Some(rel) = &field.relationship {
            let to_schema_id = active_schema_id_for_model(conn, &rel.model)?;
            let config = serde_json::to_value(rel).ok();
            insert_edge_on_conn(
                conn,
                from_schema_id,
                to_schema_id,
                &rel.model,
                DependencyType::Reference,
                Some(field_name),
                config.as_ref(),
            )?;
        }
    }
    Ok(())
}

pub(crate) fn from_schema_on_conn(conn: &Connection, schema_id: i64) -> Result<Vec<SchemaDependencyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_schema_id, to_schema_id, to_model_id, dependency_type, field_name, config
         FROM schema_dependency_edges WHERE from_schema_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![schema_id], row_to_edge)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn into_schema_on_conn(conn: &Connection, schema_id: i64) -> Result<Vec<SchemaDependencyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_schema_id, to_schema_id, to_model_id, dependency_type, field_name, config
         FROM schema_dependency_edges WHERE to_schema_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![schema_id], row_to_edge)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

/// `true` if any edge currently points `to_schema_id = schema_id`. Used to
/// enforce the `HasDependents` delete guard.
pub(crate) fn has_dependents_on_conn(conn: &Connection, schema_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM schema_dependency_edges WHERE to_schema_id = ?1",
        params![schema_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// All edges among the given schema ids, restricted to edges whose `from`
/// end is in the set (the induced subgraph the resolver operates over).
pub(crate) fn among_on_conn(conn: &Connection, schema_ids: &[i64]) -> Result<Vec<SchemaDependencyEdge>> {
    if schema_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = schema_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT id, from_schema_id, to_schema_id, to_model_id, dependency_type, field_name, config
         FROM schema_dependency_edges WHERE from_schema_id IN ({placeholders}) ORDER BY id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = schema_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), row_to_edge)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<SchemaDependencyEdge> {
    let dependency_type: String = row.get(4)?;
    let config: Option<String> = row.get(6)?;
    Ok(SchemaDependencyEdge {
        id: row.get(0)?,
        from_schema_id: row.get(1)?,
        to_schema_id: row.get(2)?,
        to_model_id: row.get(3)?,
        dependency_type: dependency_type.parse().unwrap_or(DependencyType::Reference),
        field_name: row.get(5)?,
        config: config.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;

    #[test]
    fn active_schema_id_for_model_absent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        assert_eq!(active_schema_id_for_model(&conn, "Nonexistent").unwrap(), None);
    }
}
