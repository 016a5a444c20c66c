//! `migrations` table CRUD.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use schema_engine_core::enums::MigrationStatus;

use crate::error::{Result, StorageError};
use crate::traits::MigrationRecord;

const SELECT_COLUMNS: &str = "id, name, from_schema_id, to_schema_id, from_version, to_version, \
    forward_sql, rollback_sql, is_breaking, status, applied_at, checksum";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MigrationRecord> {
    let status: String = row.get(9)?;
    let applied_at: Option<String> = row.get(10)?;
    Ok(MigrationRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        from_schema_id: row.get(2)?,
        to_schema_id: row.get(3)?,
        from_version: row.get(4)?,
        to_version: row.get(5)?,
        forward_sql: row.get(6)?,
        rollback_sql: row.get(7)?,
        is_breaking: row.get::<_, i64>(8)? != 0,
        status: status.parse().unwrap_or(MigrationStatus::Pending),
        applied_at: applied_at.map(|s| super::parse_datetime(&s)),
        checksum: row.get(11)?,
    })
}

pub(crate) fn find_by_name_on_conn(conn: &Connection, name: &str) -> Result<Option<MigrationRecord>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM migrations WHERE name = ?1"),
        params![name],
        row_to_record,
    )
    .optional()
    .map_err(Into::into)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_on_conn(
    conn: &Connection,
    name: &str,
    from_schema_id: Option<i64>,
    to_schema_id: i64,
    from_version: Option<&str>,
    to_version: &str,
    forward_sql: &str,
    rollback_sql: &str,
    is_breaking: bool,
    checksum: &str,
) -> Result<MigrationRecord> {
    conn.execute(
        "INSERT INTO migrations
            (name, from_schema_id, to_schema_id, from_version, to_version,
             forward_sql, rollback_sql, is_breaking, status, checksum)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9)",
        params![
            name,
            from_schema_id,
            to_schema_id,
            from_version,
            to_version,
            forward_sql,
            rollback_sql,
            is_breaking as i64,
            checksum,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_on_conn(conn, id)
}

pub(crate) fn get_on_conn(conn: &Connection, id: i64) -> Result<MigrationRecord> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM migrations WHERE id = ?1"),
        params![id],
        row_to_record,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("migration", id.to_string()),
        other => other.into(),
    })
}

pub(crate) fn get_by_name_on_conn(conn: &Connection, name: &str) -> Result<MigrationRecord> {
    find_by_name_on_conn(conn, name)?.ok_or_else(|| StorageError::not_found("migration", name.to_string()))
}

pub(crate) fn list_on_conn(conn: &Connection) -> Result<Vec<MigrationRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM migrations ORDER BY id ASC"))?;
    let rows = stmt.query_map([], row_to_record)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn list_for_model_on_conn(conn: &Connection, to_schema_ids: &[i64]) -> Result<Vec<MigrationRecord>> {
    if to_schema_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = to_schema_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM migrations WHERE to_schema_id IN ({placeholders}) ORDER BY id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = to_schema_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), row_to_record)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
}

/// Overwrites the generated SQL body of an existing migration in place --
/// used when a caller explicitly regenerates a `pending` (or, with the
/// `regenerate` flag, any) migration that already occupies this name.
pub(crate) fn update_sql_on_conn(
    conn: &Connection,
    id: i64,
    forward_sql: &str,
    rollback_sql: &str,
    is_breaking: bool,
    checksum: &str,
) -> Result<MigrationRecord> {
    conn.execute(
        "UPDATE migrations SET forward_sql = ?1, rollback_sql = ?2, is_breaking = ?3, checksum = ?4,
            status = 'pending', applied_at = NULL WHERE id = ?5",
        params![forward_sql, rollback_sql, is_breaking as i64, checksum, id],
    )?;
    get_on_conn(conn, id)
}

pub(crate) fn set_status_on_conn(
    conn: &Connection,
    id: i64,
    status: MigrationStatus,
    applied_at: Option<DateTime<Utc>>,
) -> Result<MigrationRecord> {
    conn.execute(
        "UPDATE migrations SET status = ?1, applied_at = ?2 WHERE id = ?3",
        params![status.as_str(), applied_at.map(|d| d.to_rfc3339()), id],
    )?;
    get_on_conn(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;

    #[test]
    fn insert_and_find_by_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        conn.execute(
            "INSERT INTO schemas (model_id, version, name, table_name, definition, status, is_system, created_by, created_at, updated_at)
             VALUES ('User', '1.0.0', 'User', 'users', '{}', 'active', 0, 'alice', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        ).unwrap();
        let schema_id = conn.last_insert_rowid();

        let record = insert_on_conn(
            &conn, "20260101000000_create_user_1_0_0", None, schema_id, None, "1.0.0",
            "CREATE TABLE...", "DROP TABLE...", false, "abc123",
        ).unwrap();
        assert_eq!(record.status, MigrationStatus::Pending);

        let found = find_by_name_on_conn(&conn, "20260101000000_create_user_1_0_0").unwrap();
        assert!(found.is_some());
    }
}
