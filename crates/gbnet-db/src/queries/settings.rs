//! Key/value bookkeeping for the scheduler and salary runs.

use rusqlite::{Connection, OptionalExtension};

use crate::{DbError, Result};

/// Unix time of the last completed maintenance run.
pub const LAST_MAINTENANCE_AT: &str = "last_maintenance_at";

/// Most recent `YYYY-MM` period the salary run finished.
pub const LAST_SALARY_PERIOD: &str = "last_salary_period";

/// Get a setting value by key.
pub fn get(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("setting '{key}'")))
}

/// Set a setting value.
pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Get a setting as u64, defaulting to `default` if not found.
pub fn get_u64(conn: &Connection, key: &str, default: u64) -> Result<u64> {
    match get(conn, key) {
        Ok(v) => v
            .parse()
            .map_err(|e: std::num::ParseIntError| DbError::Serialization(e.to_string())),
        Err(DbError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_defaults_seeded() {
        let conn = test_db();
        assert_eq!(get_u64(&conn, LAST_MAINTENANCE_AT, 7).expect("get"), 0);
        assert_eq!(get(&conn, LAST_SALARY_PERIOD).expect("get"), "");
    }

    #[test]
    fn test_set_and_get() {
        let conn = test_db();
        set(&conn, LAST_SALARY_PERIOD, "2024-03").expect("set");
        assert_eq!(get(&conn, LAST_SALARY_PERIOD).expect("get"), "2024-03");
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = test_db();
        assert!(matches!(get(&conn, "nonexistent"), Err(DbError::NotFound(_))));
        assert_eq!(get_u64(&conn, "nonexistent", 9).expect("default"), 9);
    }

    #[test]
    fn test_get_u64_rejects_garbage() {
        let conn = test_db();
        set(&conn, LAST_MAINTENANCE_AT, "soon").expect("set");
        assert!(matches!(
            get_u64(&conn, LAST_MAINTENANCE_AT, 0),
            Err(DbError::Serialization(_))
        ));
    }
}
