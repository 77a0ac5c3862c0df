//! STK wallet and lot queries.

use gbnet_types::ledger::{LotStatus, StkBalance, StkTransaction, StkTxType};
use gbnet_types::{MicroStk, Timestamp};
use rusqlite::{Connection, OptionalExtension};

use crate::{get_u64, parse_column, to_i64, DbError, Result};

const STK_COLUMNS: &str = "id, user_code, tx_type, amount, lot_status, unlock_at, unlocked_at,
     description, created_at";

fn map_stk(row: &rusqlite::Row<'_>) -> rusqlite::Result<StkTransaction> {
    Ok(StkTransaction {
        id: row.get(0)?,
        user_code: row.get(1)?,
        tx_type: parse_column(2, row.get(2)?)?,
        amount: get_u64(row, 3)?,
        lot_status: parse_column(4, row.get(4)?)?,
        unlock_at: row.get::<_, Option<i64>>(5)?.map(|v| v.max(0) as u64),
        unlocked_at: row.get::<_, Option<i64>>(6)?.map(|v| v.max(0) as u64),
        description: row.get(7)?,
        created_at: get_u64(row, 8)?,
    })
}

/// Create an empty STK wallet.
pub fn create(conn: &Connection, user_code: &str, now: Timestamp) -> Result<()> {
    conn.execute(
        "INSERT INTO stk_wallets (user_code, updated_at) VALUES (?1, ?2)",
        rusqlite::params![user_code, to_i64(now)?],
    )?;
    Ok(())
}

/// Current dual-bucket balance.
pub fn balance(conn: &Connection, user_code: &str) -> Result<StkBalance> {
    conn.query_row(
        "SELECT unlocked_balance, locked_balance FROM stk_wallets WHERE user_code = ?1",
        [user_code],
        |row| {
            Ok(StkBalance {
                available: get_u64(row, 0)?,
                locked: get_u64(row, 1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("stk wallet for '{user_code}'")))
}

/// Stored `total_balance` generated column.
pub fn stored_total(conn: &Connection, user_code: &str) -> Result<MicroStk> {
    let total: i64 = conn.query_row(
        "SELECT total_balance FROM stk_wallets WHERE user_code = ?1",
        [user_code],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}

/// Add to the available bucket.
pub fn add_available(conn: &Connection, user_code: &str, amount: MicroStk, now: Timestamp) -> Result<()> {
    let updated = conn.execute(
        "UPDATE stk_wallets SET unlocked_balance = unlocked_balance + ?1, updated_at = ?2
         WHERE user_code = ?3",
        rusqlite::params![to_i64(amount)?, to_i64(now)?, user_code],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("stk wallet for '{user_code}'")));
    }
    Ok(())
}

/// Add to the locked bucket.
pub fn add_locked(conn: &Connection, user_code: &str, amount: MicroStk, now: Timestamp) -> Result<()> {
    let updated = conn.execute(
        "UPDATE stk_wallets SET locked_balance = locked_balance + ?1, updated_at = ?2
         WHERE user_code = ?3",
        rusqlite::params![to_i64(amount)?, to_i64(now)?, user_code],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("stk wallet for '{user_code}'")));
    }
    Ok(())
}

/// Debit the available bucket only if it covers `amount`.
///
/// Returns `false` (and changes nothing) when available is short.
pub fn debit_available(
    conn: &Connection,
    user_code: &str,
    amount: MicroStk,
    now: Timestamp,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE stk_wallets SET unlocked_balance = unlocked_balance - ?1, updated_at = ?2
         WHERE user_code = ?3 AND unlocked_balance >= ?1",
        rusqlite::params![to_i64(amount)?, to_i64(now)?, user_code],
    )?;
    Ok(updated == 1)
}

/// Move `amount` from locked to available.
pub fn release_locked(conn: &Connection, user_code: &str, amount: MicroStk, now: Timestamp) -> Result<()> {
    let updated = conn.execute(
        "UPDATE stk_wallets
         SET locked_balance = locked_balance - ?1,
             unlocked_balance = unlocked_balance + ?1,
             updated_at = ?2
         WHERE user_code = ?3 AND locked_balance >= ?1",
        rusqlite::params![to_i64(amount)?, to_i64(now)?, user_code],
    )?;
    if updated == 0 {
        return Err(DbError::Constraint(format!(
            "locked balance of '{user_code}' below lot amount {amount}"
        )));
    }
    Ok(())
}

/// Fields of an STK ledger row before it has an id.
#[derive(Debug, Clone)]
pub struct NewStkTransaction<'a> {
    pub user_code: &'a str,
    pub tx_type: StkTxType,
    pub amount: MicroStk,
    pub lot_status: LotStatus,
    pub unlock_at: Option<Timestamp>,
    pub description: &'a str,
    pub request_key: Option<&'a str>,
    pub created_at: Timestamp,
}

/// Insert a ledger row and return its id.
pub fn insert_transaction(conn: &Connection, tx: &NewStkTransaction<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO stk_transactions
             (user_code, tx_type, amount, lot_status, unlock_at, description, request_key,
              created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            tx.user_code,
            tx.tx_type.as_str(),
            to_i64(tx.amount)?,
            tx.lot_status.as_str(),
            tx.unlock_at.map(to_i64).transpose()?,
            tx.description,
            tx.request_key,
            to_i64(tx.created_at)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The row stored under a member's request key, if any.
pub fn find_by_request_key(conn: &Connection, key: &str) -> Result<Option<StkTransaction>> {
    Ok(conn
        .query_row(
            &format!("SELECT {STK_COLUMNS} FROM stk_transactions WHERE request_key = ?1"),
            [key],
            map_stk,
        )
        .optional()?)
}

/// Locked lots whose `unlock_at <= now`, oldest first, at most `limit`.
pub fn due_lots(conn: &Connection, now: Timestamp, limit: u32) -> Result<Vec<StkTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STK_COLUMNS} FROM stk_transactions
         WHERE lot_status = 'locked' AND unlock_at <= ?1
         ORDER BY unlock_at, id LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![to_i64(now)?, limit], map_stk)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Flip a lot from locked to unlocked.
///
/// Returns `false` if the lot was already consumed.
pub fn mark_unlocked(conn: &Connection, lot_id: i64, now: Timestamp) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE stk_transactions SET lot_status = 'unlocked', unlocked_at = ?1
         WHERE id = ?2 AND lot_status = 'locked'",
        rusqlite::params![to_i64(now)?, lot_id],
    )?;
    Ok(updated == 1)
}

/// Ledger rows for a user, newest first.
pub fn transactions_for(conn: &Connection, user_code: &str, limit: u32) -> Result<Vec<StkTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STK_COLUMNS} FROM stk_transactions WHERE user_code = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![user_code, limit], map_stk)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Lots of a user that are still locked, soonest unlock first.
pub fn locked_lots(conn: &Connection, user_code: &str) -> Result<Vec<StkTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STK_COLUMNS} FROM stk_transactions
         WHERE user_code = ?1 AND lot_status = 'locked'
         ORDER BY unlock_at, id"
    ))?;
    let rows = stmt
        .query_map([user_code], map_stk)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
