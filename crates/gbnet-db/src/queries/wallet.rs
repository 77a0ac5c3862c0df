//! Wallet balance and transaction audit queries.

use gbnet_types::ledger::{TxStatus, WalletBalance, WalletBucket, WalletTransaction, WalletTxType};
use gbnet_types::{Paise, Timestamp};
use rusqlite::{Connection, OptionalExtension};

use crate::{get_u64, parse_column, to_i64, DbError, Result};

const TX_COLUMNS: &str = "id, user_code, tx_type, bucket, amount, gross_amount, fee_amount,
     tds_amount, status, description, balance_before, balance_after, request_key,
     counterparty_code, created_at";

fn map_tx(row: &rusqlite::Row<'_>) -> rusqlite::Result<WalletTransaction> {
    Ok(WalletTransaction {
        id: row.get(0)?,
        user_code: row.get(1)?,
        tx_type: parse_column(2, row.get(2)?)?,
        bucket: parse_column(3, row.get(3)?)?,
        amount: row.get(4)?,
        gross_amount: get_u64(row, 5)?,
        fee_amount: get_u64(row, 6)?,
        tds_amount: get_u64(row, 7)?,
        status: parse_column(8, row.get(8)?)?,
        description: row.get(9)?,
        balance_before: get_u64(row, 10)?,
        balance_after: get_u64(row, 11)?,
        request_key: row.get(12)?,
        counterparty_code: row.get(13)?,
        created_at: get_u64(row, 14)?,
    })
}

fn bucket_column(bucket: WalletBucket) -> &'static str {
    match bucket {
        WalletBucket::Main => "main_balance",
        WalletBucket::Topup => "topup_balance",
    }
}

/// Create an empty wallet for a user.
pub fn create(conn: &Connection, user_code: &str, now: Timestamp) -> Result<()> {
    conn.execute(
        "INSERT INTO wallets (user_code, updated_at) VALUES (?1, ?2)",
        rusqlite::params![user_code, to_i64(now)?],
    )?;
    Ok(())
}

/// Current balances.
pub fn balance(conn: &Connection, user_code: &str) -> Result<WalletBalance> {
    conn.query_row(
        "SELECT main_balance, topup_balance FROM wallets WHERE user_code = ?1",
        [user_code],
        |row| {
            Ok(WalletBalance {
                main_balance: get_u64(row, 0)?,
                topup_balance: get_u64(row, 1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("wallet for '{user_code}'")))
}

/// Balance of one bucket before and after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: Paise,
    pub after: Paise,
}

/// Apply a signed change to one bucket.
///
/// The update is conditional on the result staying non-negative. Returns
/// `Ok(None)` when the bucket is short, leaving it untouched.
pub fn adjust(
    conn: &Connection,
    user_code: &str,
    bucket: WalletBucket,
    delta: i64,
    now: Timestamp,
) -> Result<Option<BalanceChange>> {
    let column = bucket_column(bucket);
    let before = match bucket {
        WalletBucket::Main => balance(conn, user_code)?.main_balance,
        WalletBucket::Topup => balance(conn, user_code)?.topup_balance,
    };

    let updated = conn.execute(
        &format!(
            "UPDATE wallets SET {column} = {column} + ?1, updated_at = ?2
             WHERE user_code = ?3 AND {column} + ?1 >= 0"
        ),
        rusqlite::params![delta, to_i64(now)?, user_code],
    )?;
    if updated == 0 {
        return Ok(None);
    }

    let after = before
        .checked_add_signed(delta)
        .ok_or_else(|| DbError::Serialization(format!("balance overflow for '{user_code}'")))?;
    Ok(Some(BalanceChange { before, after }))
}

/// Fields of a transaction row before it has an id.
#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub user_code: &'a str,
    pub tx_type: WalletTxType,
    pub bucket: WalletBucket,
    pub amount: i64,
    pub gross_amount: Paise,
    pub fee_amount: Paise,
    pub tds_amount: Paise,
    pub status: TxStatus,
    pub description: &'a str,
    pub balance_before: Paise,
    pub balance_after: Paise,
    pub request_key: Option<&'a str>,
    pub counterparty_code: Option<&'a str>,
    pub reference_id: Option<i64>,
    pub created_at: Timestamp,
}

/// Insert an audit row and return its id.
pub fn insert_transaction(conn: &Connection, tx: &NewTransaction<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions
             (user_code, tx_type, bucket, amount, gross_amount, fee_amount, tds_amount, status,
              description, balance_before, balance_after, request_key, counterparty_code,
              reference_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        rusqlite::params![
            tx.user_code,
            tx.tx_type.as_str(),
            tx.bucket.as_str(),
            tx.amount,
            to_i64(tx.gross_amount)?,
            to_i64(tx.fee_amount)?,
            to_i64(tx.tds_amount)?,
            tx.status.as_str(),
            tx.description,
            to_i64(tx.balance_before)?,
            to_i64(tx.balance_after)?,
            tx.request_key,
            tx.counterparty_code,
            tx.reference_id,
            to_i64(tx.created_at)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch a transaction by id.
pub fn get_transaction(conn: &Connection, id: i64) -> Result<WalletTransaction> {
    conn.query_row(
        &format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?1"),
        [id],
        map_tx,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("transaction {id}")))
}

/// Fetch the transaction carrying a caller-supplied idempotency key.
pub fn find_by_request_key(conn: &Connection, key: &str) -> Result<Option<WalletTransaction>> {
    Ok(conn
        .query_row(
            &format!("SELECT {TX_COLUMNS} FROM transactions WHERE request_key = ?1"),
            [key],
            map_tx,
        )
        .optional()?)
}

/// The row of `tx_type` that points back at `reference_id`, if any.
pub fn find_by_reference(
    conn: &Connection,
    reference_id: i64,
    tx_type: WalletTxType,
) -> Result<Option<WalletTransaction>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {TX_COLUMNS} FROM transactions
                 WHERE reference_id = ?1 AND tx_type = ?2 ORDER BY id LIMIT 1"
            ),
            rusqlite::params![reference_id, tx_type.as_str()],
            map_tx,
        )
        .optional()?)
}

/// Pending rows of one type across all users, oldest first.
pub fn pending_of_type(conn: &Connection, tx_type: WalletTxType) -> Result<Vec<WalletTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TX_COLUMNS} FROM transactions
         WHERE tx_type = ?1 AND status = 'pending' ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map([tx_type.as_str()], map_tx)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Move a transaction from one status to another.
///
/// Returns `false` if it was not in `from` (already settled).
pub fn transition_status(
    conn: &Connection,
    id: i64,
    from: TxStatus,
    to: TxStatus,
    now: Timestamp,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE transactions SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        rusqlite::params![to.as_str(), to_i64(now)?, id, from.as_str()],
    )?;
    Ok(updated == 1)
}

/// Record the balance snapshot at settlement time for a pending row.
pub fn set_balances(conn: &Connection, id: i64, change: BalanceChange) -> Result<()> {
    conn.execute(
        "UPDATE transactions SET balance_before = ?1, balance_after = ?2 WHERE id = ?3",
        rusqlite::params![to_i64(change.before)?, to_i64(change.after)?, id],
    )?;
    Ok(())
}

/// Recent transactions for a user, newest first.
pub fn recent_transactions(
    conn: &Connection,
    user_code: &str,
    limit: u32,
) -> Result<Vec<WalletTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE user_code = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2"
    ))?;

    let rows = stmt
        .query_map(rusqlite::params![user_code, limit], map_tx)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Record a platform fee against its source transaction.
pub fn record_platform_fee(
    conn: &Connection,
    source_tx_id: i64,
    fee_type: &str,
    amount: Paise,
    now: Timestamp,
) -> Result<()> {
    conn.execute(
        "INSERT INTO platform_fees (source_tx_id, fee_type, amount, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![source_tx_id, fee_type, to_i64(amount)?, to_i64(now)?],
    )?;
    Ok(())
}

/// Sum of platform fees of a type.
pub fn platform_fee_total(conn: &Connection, fee_type: &str) -> Result<Paise> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM platform_fees WHERE fee_type = ?1",
        [fee_type],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}
