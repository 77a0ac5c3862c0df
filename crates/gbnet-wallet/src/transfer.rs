//! Member-to-member transfers and main-to-top-up moves.

use gbnet_db::queries::{users, wallet};
use gbnet_types::ledger::{WalletBucket, WalletTransaction, WalletTxType};
use gbnet_types::{apply_bps, Paise, Timestamp};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::ledger::{post, replay, row};
use crate::{require_active_user, signed, Result, WalletConfig, WalletError, FEE_TRANSFER_TAX};

/// Both sides of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Sender row; `amount` is `-(amount + tax)`.
    pub debit: WalletTransaction,
    /// Recipient row; `amount` is exactly the transferred amount.
    pub credit: WalletTransaction,
    pub tax: Paise,
}

/// Move `amount` from the sender's main balance to the recipient's.
///
/// The sender pays `amount + amount * tax_bps / 10_000`; the tax goes to
/// `platform_fees`, never to a user balance.
///
/// # Errors
///
/// - [`WalletError::SelfTransfer`] if sender and recipient match
/// - [`WalletError::RecipientNotFound`] if the recipient code does not resolve
/// - [`WalletError::InsufficientBalance`] if main cannot cover amount plus tax
pub fn transfer(
    conn: &Connection,
    sender_code: &str,
    recipient_code: &str,
    amount: Paise,
    request_key: Option<&str>,
    now: Timestamp,
    config: &WalletConfig,
) -> Result<TransferReceipt> {
    let prior = replay(
        conn,
        request_key,
        sender_code,
        WalletTxType::TransferOut,
        amount,
        Some(recipient_code),
    )?;
    if let Some(debit) = prior {
        let credit = wallet::find_by_reference(conn, debit.id, WalletTxType::TransferIn)?
            .ok_or(WalletError::TransactionNotFound(debit.id))?;
        return Ok(TransferReceipt {
            tax: debit.fee_amount,
            debit,
            credit,
        });
    }
    if amount == 0 {
        return Err(WalletError::InvalidAmount("transfer of zero".to_string()));
    }
    if sender_code == recipient_code {
        return Err(WalletError::SelfTransfer);
    }
    require_active_user(conn, sender_code)?;
    let recipient = users::find(conn, recipient_code)?
        .ok_or_else(|| WalletError::RecipientNotFound(recipient_code.to_string()))?;
    if !recipient.is_active {
        return Err(WalletError::AccountBlocked(recipient.user_code));
    }

    let tax = apply_bps(amount, config.transfer_tax_bps).ok_or(WalletError::Overflow)?;
    let total = amount.checked_add(tax).ok_or(WalletError::Overflow)?;

    let receipt = gbnet_db::with_savepoint(conn, "transfer", |conn| {
        let out_desc = format!("transfer to {recipient_code}");
        let mut out = row(
            sender_code,
            WalletTxType::TransferOut,
            WalletBucket::Main,
            -signed(total)?,
            &out_desc,
            now,
        );
        out.gross_amount = amount;
        out.fee_amount = tax;
        out.counterparty_code = Some(recipient_code);
        out.request_key = request_key;
        let debit = post(conn, out)?;

        let in_desc = format!("transfer from {sender_code}");
        let mut incoming = row(
            recipient_code,
            WalletTxType::TransferIn,
            WalletBucket::Main,
            signed(amount)?,
            &in_desc,
            now,
        );
        incoming.counterparty_code = Some(sender_code);
        incoming.reference_id = Some(debit.id);
        let credit = post(conn, incoming)?;

        if tax > 0 {
            wallet::record_platform_fee(conn, debit.id, FEE_TRANSFER_TAX, tax, now)?;
        }
        Ok::<_, WalletError>(TransferReceipt { debit, credit, tax })
    })?;

    tracing::info!(
        sender = %sender_code,
        recipient = %recipient_code,
        amount,
        tax,
        "transfer completed"
    );
    Ok(receipt)
}

/// Move `amount` from main to top-up. There is no way back.
///
/// Returns the main (debit) row and the top-up (credit) row.
pub fn topup(
    conn: &Connection,
    user_code: &str,
    amount: Paise,
    request_key: Option<&str>,
    now: Timestamp,
    config: &WalletConfig,
) -> Result<(WalletTransaction, WalletTransaction)> {
    let prior = replay(conn, request_key, user_code, WalletTxType::Topup, amount, None)?;
    if let Some(debit) = prior {
        let credit = wallet::find_by_reference(conn, debit.id, WalletTxType::Topup)?
            .ok_or(WalletError::TransactionNotFound(debit.id))?;
        return Ok((debit, credit));
    }
    if amount < config.min_topup {
        return Err(WalletError::BelowMinimum {
            amount,
            minimum: config.min_topup,
        });
    }
    require_active_user(conn, user_code)?;

    gbnet_db::with_savepoint(conn, "topup", |conn| {
        let mut out = row(
            user_code,
            WalletTxType::Topup,
            WalletBucket::Main,
            -signed(amount)?,
            "top-up from main",
            now,
        );
        out.request_key = request_key;
        let debit = post(conn, out)?;

        let mut incoming = row(
            user_code,
            WalletTxType::Topup,
            WalletBucket::Topup,
            signed(amount)?,
            "top-up from main",
            now,
        );
        incoming.reference_id = Some(debit.id);
        let credit = post(conn, incoming)?;
        Ok((debit, credit))
    })
}
