//! Deposits: a member asks, an admin approves or rejects.
//!
//! The request is recorded as a pending row without touching the balance;
//! approval credits main and stamps the row with the balance it produced.

use gbnet_db::queries::wallet::{self, BalanceChange};
use gbnet_types::ledger::{TxStatus, WalletBucket, WalletTransaction, WalletTxType};
use gbnet_types::{Paise, Timestamp};
use rusqlite::Connection;

use crate::ledger::{record, replay, row};
use crate::{require_active_user, signed, Result, WalletConfig, WalletError};

/// Record a pending deposit of `amount`.
///
/// `reference` is the member's payment reference, kept in the description.
pub fn deposit_request(
    conn: &Connection,
    user_code: &str,
    amount: Paise,
    reference: &str,
    request_key: Option<&str>,
    now: Timestamp,
    config: &WalletConfig,
) -> Result<WalletTransaction> {
    let prior = replay(conn, request_key, user_code, WalletTxType::Deposit, amount, None)?;
    if let Some(existing) = prior {
        return Ok(existing);
    }
    if amount < config.min_deposit {
        return Err(WalletError::BelowMinimum {
            amount,
            minimum: config.min_deposit,
        });
    }
    require_active_user(conn, user_code)?;

    let description = format!("deposit {reference}");
    let mut tx = row(
        user_code,
        WalletTxType::Deposit,
        WalletBucket::Main,
        signed(amount)?,
        &description,
        now,
    );
    tx.status = TxStatus::Pending;
    tx.request_key = request_key;
    record(conn, tx)
}

fn pending_deposit(conn: &Connection, tx_id: i64) -> Result<WalletTransaction> {
    let tx = wallet::get_transaction(conn, tx_id).map_err(|e| match e {
        gbnet_db::DbError::NotFound(_) => WalletError::TransactionNotFound(tx_id),
        other => other.into(),
    })?;
    if tx.tx_type != WalletTxType::Deposit {
        return Err(WalletError::TransactionNotFound(tx_id));
    }
    if tx.status != TxStatus::Pending {
        return Err(WalletError::NotPending {
            id: tx_id,
            status: tx.status,
        });
    }
    Ok(tx)
}

/// Approve a pending deposit and credit the member's main balance.
pub fn approve_deposit(conn: &Connection, tx_id: i64, now: Timestamp) -> Result<WalletTransaction> {
    let tx = pending_deposit(conn, tx_id)?;

    gbnet_db::with_savepoint(conn, "approve_deposit", |conn| {
        if !wallet::transition_status(conn, tx_id, TxStatus::Pending, TxStatus::Completed, now)? {
            return Err(WalletError::NotPending {
                id: tx_id,
                status: tx.status,
            });
        }
        let change: BalanceChange =
            wallet::adjust(conn, &tx.user_code, WalletBucket::Main, tx.amount, now)?
                .ok_or_else(|| WalletError::UserNotFound(tx.user_code.clone()))?;
        wallet::set_balances(conn, tx_id, change)?;

        tracing::info!(
            user = %tx.user_code,
            tx_id,
            amount = tx.amount,
            balance_before = change.before,
            balance_after = change.after,
            "deposit approved"
        );
        Ok(wallet::get_transaction(conn, tx_id)?)
    })
}

/// Reject a pending deposit. No balance changes.
pub fn reject_deposit(conn: &Connection, tx_id: i64, now: Timestamp) -> Result<WalletTransaction> {
    let tx = pending_deposit(conn, tx_id)?;
    if !wallet::transition_status(conn, tx_id, TxStatus::Pending, TxStatus::Rejected, now)? {
        return Err(WalletError::NotPending {
            id: tx_id,
            status: tx.status,
        });
    }
    tracing::info!(user = %tx.user_code, tx_id, amount = tx.amount, "deposit rejected");
    Ok(wallet::get_transaction(conn, tx_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::balance;
    use crate::testutil::two_users;

    #[test]
    fn test_request_then_approve() {
        let conn = two_users();
        let config = WalletConfig::default();
        let tx = deposit_request(&conn, "GB00001", 50_000, "UTR123", None, 5, &config)
            .expect("request");
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(balance(&conn, "GB00001").expect("balance").main_balance, 0);

        let done = approve_deposit(&conn, tx.id, 6).expect("approve");
        assert_eq!(done.status, TxStatus::Completed);
        assert_eq!(done.balance_before, 0);
        assert_eq!(done.balance_after, 50_000);
        assert_eq!(balance(&conn, "GB00001").expect("balance").main_balance, 50_000);

        assert!(matches!(
            approve_deposit(&conn, tx.id, 7),
            Err(WalletError::NotPending { .. })
        ));
    }

    #[test]
    fn test_reject_leaves_balance() {
        let conn = two_users();
        let tx = deposit_request(&conn, "GB00001", 50_000, "UTR9", None, 5, &WalletConfig::default())
            .expect("request");
        let rejected = reject_deposit(&conn, tx.id, 6).expect("reject");
        assert_eq!(rejected.status, TxStatus::Rejected);
        assert_eq!(balance(&conn, "GB00001").expect("balance").main_balance, 0);
    }

    #[test]
    fn test_minimum_and_replay() {
        let conn = two_users();
        let config = WalletConfig::default();
        assert!(matches!(
            deposit_request(&conn, "GB00001", 1, "x", None, 5, &config),
            Err(WalletError::BelowMinimum { .. })
        ));

        let first = deposit_request(&conn, "GB00001", 20_000, "r", Some("dep-1"), 5, &config)
            .expect("first");
        let again = deposit_request(&conn, "GB00001", 20_000, "r", Some("dep-1"), 6, &config)
            .expect("replay");
        assert_eq!(first.id, again.id);
    }

    #[test]
    fn test_unknown_transaction() {
        let conn = two_users();
        assert!(matches!(
            approve_deposit(&conn, 999, 1),
            Err(WalletError::TransactionNotFound(999))
        ));
    }
}
