//! Business volume queries.
//!
//! The leg aggregation here is the "team business volume" aggregator: a
//! recursive CTE collects the leg's members, then the beneficiary's active
//! entries sourced from those members are summed.

use gbnet_types::ledger::{BvEntry, BvStatus};
use gbnet_types::{CentiBv, Side, Timestamp};
use rusqlite::Connection;

use crate::{get_u64, parse_column, to_i64, Result};

const BV_COLUMNS: &str = "id, user_code, source_user_code, purchase_id, level, amount,
     created_at, expiry_date, status";

fn map_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<BvEntry> {
    Ok(BvEntry {
        id: row.get(0)?,
        user_code: row.get(1)?,
        source_user_code: row.get(2)?,
        purchase_id: row.get(3)?,
        level: row.get(4)?,
        amount: get_u64(row, 5)?,
        created_at: get_u64(row, 6)?,
        expiry_date: get_u64(row, 7)?,
        status: parse_column(8, row.get(8)?)?,
    })
}

/// Fields of a BV entry before it has an id.
#[derive(Debug, Clone)]
pub struct NewBvEntry<'a> {
    pub user_code: &'a str,
    pub source_user_code: &'a str,
    pub purchase_id: &'a str,
    pub level: u8,
    pub amount: CentiBv,
    pub created_at: Timestamp,
    pub expiry_date: Timestamp,
}

/// Insert an active entry and return its id.
pub fn insert_entry(conn: &Connection, entry: &NewBvEntry<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO business_volume
             (user_code, source_user_code, purchase_id, level, amount, created_at, expiry_date, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active')",
        rusqlite::params![
            entry.user_code,
            entry.source_user_code,
            entry.purchase_id,
            entry.level,
            to_i64(entry.amount)?,
            to_i64(entry.created_at)?,
            to_i64(entry.expiry_date)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// True if any entry exists for the purchase.
pub fn purchase_recorded(conn: &Connection, purchase_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM business_volume WHERE purchase_id = ?1)",
        [purchase_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// All entries for a purchase, by level.
pub fn entries_for_purchase(conn: &Connection, purchase_id: &str) -> Result<Vec<BvEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BV_COLUMNS} FROM business_volume WHERE purchase_id = ?1 ORDER BY level"
    ))?;
    let rows = stmt
        .query_map([purchase_id], map_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Entries credited to a user, newest first.
pub fn entries_for_user(conn: &Connection, user_code: &str, limit: u32) -> Result<Vec<BvEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BV_COLUMNS} FROM business_volume WHERE user_code = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![user_code, limit], map_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Transition every active entry with `expiry_date <= now` to expired.
///
/// Returns the number of rows transitioned; zero on a re-run.
pub fn expire_due(conn: &Connection, now: Timestamp) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE business_volume SET status = ?1
         WHERE status = ?2 AND expiry_date <= ?3",
        rusqlite::params![
            BvStatus::Expired.as_str(),
            BvStatus::Active.as_str(),
            to_i64(now)?
        ],
    )?;
    Ok(updated)
}

/// Sum of a user's active entries.
pub fn active_total(conn: &Connection, user_code: &str) -> Result<CentiBv> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM business_volume
         WHERE user_code = ?1 AND status = 'active'",
        [user_code],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}

/// Sum of the user's active entries whose source sits in the `side` leg.
pub fn leg_active_total(conn: &Connection, user_code: &str, side: Side) -> Result<CentiBv> {
    let total: i64 = conn.query_row(
        "WITH RECURSIVE leg(code) AS (
             SELECT user_code FROM users WHERE sponsor_code = ?1 AND side = ?2
             UNION ALL
             SELECT u.user_code FROM users u JOIN leg ON u.sponsor_code = leg.code
         )
         SELECT COALESCE(SUM(bv.amount), 0) FROM business_volume bv
         WHERE bv.user_code = ?1
           AND bv.status = 'active'
           AND bv.source_user_code IN (SELECT code FROM leg)",
        rusqlite::params![user_code, side.as_str()],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}
