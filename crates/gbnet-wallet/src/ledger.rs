//! Posting balance changes with their audit rows.

use gbnet_db::queries::wallet::{self, NewTransaction};
use gbnet_types::ledger::{TxStatus, WalletBalance, WalletBucket, WalletTransaction, WalletTxType};
use gbnet_types::{Paise, Timestamp};
use rusqlite::Connection;

use crate::{require_active_user, signed, Result, WalletError};

/// A completed row with no fees, counterparty or key. Callers fill the rest.
pub(crate) fn row<'a>(
    user_code: &'a str,
    tx_type: WalletTxType,
    bucket: WalletBucket,
    amount: i64,
    description: &'a str,
    now: Timestamp,
) -> NewTransaction<'a> {
    NewTransaction {
        user_code,
        tx_type,
        bucket,
        amount,
        gross_amount: amount.unsigned_abs(),
        fee_amount: 0,
        tds_amount: 0,
        status: TxStatus::Completed,
        description,
        balance_before: 0,
        balance_after: 0,
        request_key: None,
        counterparty_code: None,
        reference_id: None,
        created_at: now,
    }
}

/// Apply `tx.amount` to `tx.bucket` and write the audit row.
///
/// # Errors
///
/// - [`WalletError::InsufficientBalance`] if a debit would overdraw the bucket
pub(crate) fn post(conn: &Connection, mut tx: NewTransaction<'_>) -> Result<WalletTransaction> {
    let change = match wallet::adjust(conn, tx.user_code, tx.bucket, tx.amount, tx.created_at)? {
        Some(change) => change,
        None => {
            let current = wallet::balance(conn, tx.user_code)?;
            let available = match tx.bucket {
                WalletBucket::Main => current.main_balance,
                WalletBucket::Topup => current.topup_balance,
            };
            return Err(WalletError::InsufficientBalance {
                available,
                required: tx.amount.unsigned_abs(),
            });
        }
    };
    tx.balance_before = change.before;
    tx.balance_after = change.after;

    let id = wallet::insert_transaction(conn, &tx)?;
    tracing::info!(
        user = %tx.user_code,
        tx_type = %tx.tx_type,
        bucket = %tx.bucket,
        amount = tx.amount,
        balance_before = change.before,
        balance_after = change.after,
        tx_id = id,
        "wallet posted"
    );
    Ok(wallet::get_transaction(conn, id)?)
}

/// Write an audit row without touching any balance (pending requests).
pub(crate) fn record(conn: &Connection, mut tx: NewTransaction<'_>) -> Result<WalletTransaction> {
    let current = wallet::balance(conn, tx.user_code)?;
    let snapshot = match tx.bucket {
        WalletBucket::Main => current.main_balance,
        WalletBucket::Topup => current.topup_balance,
    };
    tx.balance_before = snapshot;
    tx.balance_after = snapshot;
    let id = wallet::insert_transaction(conn, &tx)?;
    tracing::info!(
        user = %tx.user_code,
        tx_type = %tx.tx_type,
        status = %tx.status,
        amount = tx.amount,
        tx_id = id,
        "wallet request recorded"
    );
    Ok(wallet::get_transaction(conn, id)?)
}

/// The row a request key already produced, if it records the same request:
/// same user, operation, gross amount and counterparty.
///
/// # Errors
///
/// - [`WalletError::RequestKeyConflict`] if the key was used for a different request
pub fn replay(
    conn: &Connection,
    request_key: Option<&str>,
    user_code: &str,
    tx_type: WalletTxType,
    gross: Paise,
    counterparty: Option<&str>,
) -> Result<Option<WalletTransaction>> {
    let Some(key) = request_key else {
        return Ok(None);
    };
    match wallet::find_by_request_key(conn, key)? {
        Some(tx)
            if tx.user_code == user_code
                && tx.tx_type == tx_type
                && tx.gross_amount == gross
                && tx.counterparty_code.as_deref() == counterparty =>
        {
            tracing::debug!(user = %user_code, request_key = key, tx_id = tx.id, "request replayed");
            Ok(Some(tx))
        }
        Some(tx) => {
            tracing::warn!(
                user = %user_code,
                request_key = key,
                tx_id = tx.id,
                "request key reused for a different request"
            );
            Err(WalletError::RequestKeyConflict(key.to_string()))
        }
        None => Ok(None),
    }
}

/// Credit the main balance (commission, salary, STK sale proceeds).
pub fn credit_main(
    conn: &Connection,
    user_code: &str,
    amount: Paise,
    tx_type: WalletTxType,
    description: &str,
    now: Timestamp,
) -> Result<WalletTransaction> {
    credit_main_keyed(conn, user_code, amount, tx_type, description, None, now)
}

/// [`credit_main`] for a member request, storing `request_key` on the row so
/// a retry can find it through [`replay`].
pub fn credit_main_keyed(
    conn: &Connection,
    user_code: &str,
    amount: Paise,
    tx_type: WalletTxType,
    description: &str,
    request_key: Option<&str>,
    now: Timestamp,
) -> Result<WalletTransaction> {
    if amount == 0 {
        return Err(WalletError::InvalidAmount("credit of zero".to_string()));
    }
    let mut tx = row(user_code, tx_type, WalletBucket::Main, signed(amount)?, description, now);
    tx.request_key = request_key;
    post(conn, tx)
}

/// Pay for a purchase, drawing on the top-up balance first and the main
/// balance for the remainder.
///
/// Returns one row per bucket actually debited.
///
/// # Errors
///
/// - [`WalletError::InsufficientBalance`] if both buckets together fall short
pub fn debit_for_purchase(
    conn: &Connection,
    user_code: &str,
    amount: Paise,
    description: &str,
    now: Timestamp,
) -> Result<Vec<WalletTransaction>> {
    if amount == 0 {
        return Err(WalletError::InvalidAmount("purchase of zero".to_string()));
    }
    require_active_user(conn, user_code)?;

    let current = wallet::balance(conn, user_code)?;
    let available = current
        .main_balance
        .checked_add(current.topup_balance)
        .ok_or(WalletError::Overflow)?;
    if available < amount {
        return Err(WalletError::InsufficientBalance {
            available,
            required: amount,
        });
    }

    let from_topup = amount.min(current.topup_balance);
    let from_main = amount - from_topup;

    gbnet_db::with_savepoint(conn, "debit_for_purchase", |conn| {
        let mut rows = Vec::with_capacity(2);
        for (bucket, part) in [(WalletBucket::Topup, from_topup), (WalletBucket::Main, from_main)] {
            if part == 0 {
                continue;
            }
            rows.push(post(
                conn,
                row(user_code, WalletTxType::Purchase, bucket, -signed(part)?, description, now),
            )?);
        }
        Ok(rows)
    })
}

/// Current balances.
pub fn balance(conn: &Connection, user_code: &str) -> Result<WalletBalance> {
    Ok(wallet::balance(conn, user_code)?)
}

/// Recent audit rows, newest first.
pub fn history(conn: &Connection, user_code: &str, limit: u32) -> Result<Vec<WalletTransaction>> {
    Ok(wallet::recent_transactions(conn, user_code, limit)?)
}
