//! Key/value `config` table access -- seed values from
//! [`super::schema::DEFAULT_CONFIG`], typed lookups for the handful of keys
//! the repository/resolver consult at runtime.

use rusqlite::{params, Connection};

use crate::error::Result;

pub(crate) fn get_config_on_conn(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM config WHERE key = ?1", params![key], |row| row.get(0))
        .ok();
    Ok(value)
}

pub(crate) fn set_config_on_conn(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// Reads `dependency_max_depth`, falling back to the seeded default of 10
/// if the key is somehow absent.
pub(crate) fn dependency_max_depth_on_conn(conn: &Connection) -> Result<u32> {
    let raw = get_config_on_conn(conn, "dependency_max_depth")?;
    Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;

    #[test]
    fn default_max_depth_seeded() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        assert_eq!(dependency_max_depth_on_conn(&conn).unwrap(), 10);
    }

    #[test]
    fn set_and_get_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        set_config_on_conn(&conn, "dependency_max_depth", "5").unwrap();
        assert_eq!(dependency_max_depth_on_conn(&conn).unwrap(), 5);
    }
}
