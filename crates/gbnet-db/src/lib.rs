//! # gbnet-db
//!
//! Persistence layer for the GBNet compensation engine.
//! Manages the single SQLite database at `$GBNET_DATA_DIR/gbnet.db`.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced
//! - All timestamps are Unix epoch seconds
//! - Money in paise, BV in centi-BV, STK in micro-STK (all INTEGER)
//! - Schema version stored in `PRAGMA user_version`
//!
//! Query functions take `&Connection` and never open transactions
//! themselves; callers wrap a whole operation in one transaction (see
//! [`immediate`]) so every balance change and its audit row commit together.

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;
use std::str::FromStr;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Milliseconds a statement waits on a locked database before failing.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    /// The database stayed locked past the busy timeout. Retryable.
    #[error("database busy: {0}")]
    Busy(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// True if the caller may retry the whole operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                DbError::Busy(err.to_string())
            }
            Some(ErrorCode::ConstraintViolation) => DbError::Constraint(err.to_string()),
            _ => DbError::Sqlite(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the GBNet database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Begin a transaction that takes the write lock up front.
///
/// Writers are serialized for the lifetime of the transaction, which is what
/// keeps concurrent balance updates on one user from interleaving.
pub fn immediate(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Run `f` inside a named savepoint.
///
/// Everything `f` wrote is rolled back if it returns an error; the outer
/// transaction (if any) is left open either way.
pub fn with_savepoint<T, E, F>(conn: &Connection, name: &str, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&Connection) -> std::result::Result<T, E>,
    E: From<DbError>,
{
    conn.execute_batch(&format!("SAVEPOINT {name}"))
        .map_err(DbError::from)?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name}"))
                .map_err(DbError::from)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) =
                conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
            {
                tracing::warn!(savepoint = name, error = %rollback, "savepoint rollback failed");
            }
            Err(err)
        }
    }
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;"
    ))?;
    Ok(())
}

/// Parse a TEXT column into one of the typed enums.
pub(crate) fn parse_column<T>(idx: usize, text: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Read an INTEGER column holding a non-negative amount.
pub(crate) fn get_u64(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

/// Convert an amount for binding. Amounts above `i64::MAX` are rejected.
pub(crate) fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| DbError::Serialization(format!("amount {value} exceeds i64")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_wal_mode() {
        let conn = open_memory().expect("open");
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("get journal_mode");
        // In-memory databases use "memory" mode, not WAL
        assert!(mode == "wal" || mode == "memory");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open_memory().expect("open");
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("get foreign_keys");
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_busy_timeout_configured() {
        let conn = open_memory().expect("open");
        let timeout: u32 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("get busy_timeout");
        assert_eq!(timeout, BUSY_TIMEOUT_MS);
    }

    #[test]
    fn test_constraint_error_classified() {
        let conn = open_memory().expect("open");
        conn.execute("INSERT INTO settings (key, value) VALUES ('k', 'v')", [])
            .expect("first insert");
        let err: DbError = conn
            .execute("INSERT INTO settings (key, value) VALUES ('k', 'v')", [])
            .expect_err("duplicate key")
            .into();
        assert!(matches!(err, DbError::Constraint(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_savepoint_rolls_back_on_error() {
        let conn = open_memory().expect("open");
        let result: Result<()> = with_savepoint(&conn, "sp_test", |c| {
            c.execute("INSERT INTO settings (key, value) VALUES ('tmp', '1')", [])?;
            Err(DbError::Constraint("forced".to_string()))
        });
        assert!(result.is_err());

        with_savepoint(&conn, "sp_test", |c| -> Result<()> {
            c.execute("INSERT INTO settings (key, value) VALUES ('kept', '1')", [])?;
            Ok(())
        })
        .expect("commit");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM settings WHERE key IN ('tmp', 'kept')",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_immediate_rolls_back_on_drop() {
        let mut conn = open_memory().expect("open");
        {
            let tx = immediate(&mut conn).expect("begin");
            tx.execute("INSERT INTO settings (key, value) VALUES ('tmp', '1')", [])
                .expect("insert");
            // dropped without commit
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM settings WHERE key = 'tmp'", [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, 0);
    }
}
