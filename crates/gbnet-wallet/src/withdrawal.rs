//! Withdrawals.
//!
//! The gross amount leaves the main balance as soon as the request is
//! accepted and sits in a pending row. Completion books the processing fee
//! and TDS; rejection refunds the gross amount with its own row.

use gbnet_db::queries::wallet;
use gbnet_db::DbError;
use gbnet_types::ledger::{TxStatus, WalletBucket, WalletTransaction, WalletTxType};
use gbnet_types::{apply_bps, KycStatus, Paise, Timestamp};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::ledger::{post, replay, row};
use crate::{
    require_active_user, signed, Result, WalletConfig, WalletError, FEE_WITHDRAWAL_PROCESSING,
    FEE_WITHDRAWAL_TDS,
};

/// Breakdown of a withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQuote {
    pub gross: Paise,
    pub processing_fee: Paise,
    pub tds: Paise,
    /// What reaches the member's bank.
    pub net: Paise,
}

impl WithdrawalQuote {
    /// Price a withdrawal of `gross`. Fees round down.
    pub fn new(gross: Paise, config: &WalletConfig) -> Result<Self> {
        let processing_fee =
            apply_bps(gross, config.withdrawal_fee_bps).ok_or(WalletError::Overflow)?;
        let tds = apply_bps(gross, config.tds_bps).ok_or(WalletError::Overflow)?;
        let net = gross
            .checked_sub(processing_fee)
            .and_then(|v| v.checked_sub(tds))
            .ok_or(WalletError::Overflow)?;
        Ok(Self {
            gross,
            processing_fee,
            tds,
            net,
        })
    }
}

/// Hold `gross` from the main balance as a pending withdrawal.
///
/// # Errors
///
/// - [`WalletError::BelowMinimum`] / [`WalletError::AboveMaximum`] outside the limits
/// - [`WalletError::KycNotApproved`] unless KYC is approved
/// - [`WalletError::InsufficientBalance`] if main cannot cover `gross`
pub fn withdraw(
    conn: &Connection,
    user_code: &str,
    gross: Paise,
    request_key: Option<&str>,
    now: Timestamp,
    config: &WalletConfig,
) -> Result<WalletTransaction> {
    let prior = replay(conn, request_key, user_code, WalletTxType::Withdrawal, gross, None)?;
    if let Some(existing) = prior {
        return Ok(existing);
    }
    if gross < config.min_withdrawal {
        return Err(WalletError::BelowMinimum {
            amount: gross,
            minimum: config.min_withdrawal,
        });
    }
    if gross > config.max_withdrawal {
        return Err(WalletError::AboveMaximum {
            amount: gross,
            maximum: config.max_withdrawal,
        });
    }
    let user = require_active_user(conn, user_code)?;
    if user.kyc_status != KycStatus::Approved {
        return Err(WalletError::KycNotApproved(user.user_code));
    }

    let quote = WithdrawalQuote::new(gross, config)?;
    let description = format!("withdrawal, net {}", quote.net);
    let mut tx = row(
        user_code,
        WalletTxType::Withdrawal,
        WalletBucket::Main,
        -signed(gross)?,
        &description,
        now,
    );
    tx.status = TxStatus::Pending;
    tx.fee_amount = quote.processing_fee;
    tx.tds_amount = quote.tds;
    tx.request_key = request_key;
    post(conn, tx)
}

fn pending_withdrawal(conn: &Connection, tx_id: i64) -> Result<WalletTransaction> {
    let tx = wallet::get_transaction(conn, tx_id).map_err(|e| match e {
        DbError::NotFound(_) => WalletError::TransactionNotFound(tx_id),
        other => other.into(),
    })?;
    if tx.tx_type != WalletTxType::Withdrawal {
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

/// Mark a pending withdrawal as paid out and book its fees.
pub fn complete_withdrawal(
    conn: &Connection,
    tx_id: i64,
    now: Timestamp,
) -> Result<WalletTransaction> {
    let tx = pending_withdrawal(conn, tx_id)?;

    gbnet_db::with_savepoint(conn, "complete_withdrawal", |conn| {
        if !wallet::transition_status(conn, tx_id, TxStatus::Pending, TxStatus::Completed, now)? {
            return Err(WalletError::NotPending {
                id: tx_id,
                status: tx.status,
            });
        }
        if tx.fee_amount > 0 {
            wallet::record_platform_fee(conn, tx_id, FEE_WITHDRAWAL_PROCESSING, tx.fee_amount, now)?;
        }
        if tx.tds_amount > 0 {
            wallet::record_platform_fee(conn, tx_id, FEE_WITHDRAWAL_TDS, tx.tds_amount, now)?;
        }
        tracing::info!(
            user = %tx.user_code,
            tx_id,
            gross = tx.gross_amount,
            fee = tx.fee_amount,
            tds = tx.tds_amount,
            "withdrawal completed"
        );
        Ok(wallet::get_transaction(conn, tx_id)?)
    })
}

/// Reject a pending withdrawal and refund the held gross amount.
///
/// Returns the refund row.
pub fn reject_withdrawal(
    conn: &Connection,
    tx_id: i64,
    reason: &str,
    now: Timestamp,
) -> Result<WalletTransaction> {
    let tx = pending_withdrawal(conn, tx_id)?;

    gbnet_db::with_savepoint(conn, "reject_withdrawal", |conn| {
        if !wallet::transition_status(conn, tx_id, TxStatus::Pending, TxStatus::Rejected, now)? {
            return Err(WalletError::NotPending {
                id: tx_id,
                status: tx.status,
            });
        }
        let description = format!("withdrawal {tx_id} rejected: {reason}");
        let mut refund = row(
            &tx.user_code,
            WalletTxType::Refund,
            WalletBucket::Main,
            signed(tx.gross_amount)?,
            &description,
            now,
        );
        refund.reference_id = Some(tx_id);
        post(conn, refund)
    })
}
