//! Append-only `change_log` table -- one row per mutation against a
//! [`crate::traits::SchemaRecord`], written in the same transaction as the
//! mutation itself.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde_json::Value;

use schema_engine_core::enums::ChangeType;

use crate::error::Result;
use crate::traits::{ChangeLogEntry, ChangeLogFilter};

/// Inserts an audit row and returns the full entry, so the caller can hand
/// it to the host's event hook after committing the enclosing transaction.
pub(crate) fn append_on_conn(
    conn: &Connection,
    schema_id: i64,
    change_type: ChangeType,
    previous_state: Option<&Value>,
    new_state: Option<&Value>,
    actor: &str,
    occurred_at: DateTime<Utc>,
) -> Result<ChangeLogEntry> {
    conn.execute(
        "INSERT INTO change_log
            (schema_id, change_type, previous_state, new_state, actor, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            schema_id,
            change_type.as_str(),
            previous_state.map(|v| v.to_string()),
            new_state.map(|v| v.to_string()),
            actor,
            occurred_at.to_rfc3339(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(ChangeLogEntry {
        id,
        schema_id,
        change_type,
        previous_state: previous_state.cloned(),
        new_state: new_state.cloned(),
        actor: actor.to_string(),
        occurred_at,
    })
}

/// Dynamic-`WHERE` listing over [`ChangeLogFilter`].
pub(crate) fn list_filtered_on_conn(conn: &Connection, filter: &ChangeLogFilter) -> Result<Vec<ChangeLogEntry>> {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut param_idx: usize = 1;

    if let Some(schema_id) = filter.schema_id {
        where_clauses.push(format!("schema_id = ?{param_idx}"));
        param_values.push(Box::new(schema_id));
        param_idx += 1;
    }
    if let Some(change_type) = &filter.change_type {
        where_clauses.push(format!("change_type = ?{param_idx}"));
        param_values.push(Box::new(change_type.as_str().to_string()));
        param_idx += 1;
    }
    if let Some(occurred_after) = filter.occurred_after {
        where_clauses.push(format!("occurred_at >= ?{param_idx}"));
        param_values.push(Box::new(occurred_after.to_rfc3339()));
        param_idx += 1;
    }
    if let Some(occurred_before) = filter.occurred_before {
        where_clauses.push(format!("occurred_at <= ?{param_idx}"));
        param_values.push(Box::new(occurred_before.to_rfc3339()));
        param_idx += 1;
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };
    let limit_sql = filter.limit.map(|l| format!(" LIMIT {l}")).unwrap_or_default();
    let sql = format!(
        "SELECT id, schema_id, change_type, previous_state, new_state, actor, occurred_at
         FROM change_log {where_sql} ORDER BY occurred_at DESC, id DESC{limit_sql}"
    );

    let param_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), row_to_entry)?;
    let _ = param_idx;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn for_schema_on_conn(conn: &Connection, schema_id: i64) -> Result<Vec<ChangeLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, schema_id, change_type, previous_state, new_state, actor, occurred_at
         FROM change_log WHERE schema_id = ?1 ORDER BY occurred_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![schema_id], row_to_entry)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn recent_on_conn(conn: &Connection, limit: usize) -> Result<Vec<ChangeLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, schema_id, change_type, previous_state, new_state, actor, occurred_at
         FROM change_log ORDER BY occurred_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], row_to_entry)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
    let change_type: String = row.get(2)?;
    let previous_state: Option<String> = row.get(3)?;
    let new_state: Option<String> = row.get(4)?;
    let occurred_at: String = row.get(6)?;
    Ok(ChangeLogEntry {
        id: row.get(0)?,
        schema_id: row.get(1)?,
        change_type: change_type.parse().unwrap_or(ChangeType::Updated),
        previous_state: previous_state.and_then(|s| serde_json::from_str(&s).ok()),
        new_state: new_state.and_then(|s| serde_json::from_str(&s).ok()),
        actor: row.get(5)?,
        occurred_at: crate::sqlite::parse_datetime(&occurred_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn list_filtered_by_change_type() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        append_on_conn(&conn, 1, ChangeType::Created, None, None, "alice", now()).unwrap();
        append_on_conn(&conn, 1, ChangeType::Updated, None, None, "alice", now()).unwrap();

        let filter = ChangeLogFilter { change_type: Some(ChangeType::Updated), ..Default::default() };
        let entries = list_filtered_on_conn(&conn, &filter).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].change_type, ChangeType::Updated);
    }

    #[test]
    fn list_filtered_respects_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        for _ in 0..5 {
            append_on_conn(&conn, 1, ChangeType::Updated, None, None, "alice", now()).unwrap();
        }
        let filter = ChangeLogFilter { limit: Some(2), ..Default::default() };
        assert_eq!(list_filtered_on_conn(&conn, &filter).unwrap().len(), 2);
    }

    #[test]
    fn list_filtered_by_schema_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        append_on_conn(&conn, 1, ChangeType::Created, None, None, "alice", now()).unwrap();
        append_on_conn(&conn, 2, ChangeType::Created, None, None, "alice", now()).unwrap();

        let filter = ChangeLogFilter { schema_id: Some(2), ..Default::default() };
        let entries = list_filtered_on_conn(&conn, &filter).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].schema_id, 2);
    }
}
