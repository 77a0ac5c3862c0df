//! # gbnet-wallet
//!
//! Money ledger: a withdrawable main balance and a shopping-only top-up
//! balance per user, with an audit row for every change.
//!
//! Every balance mutation and its `transactions` row are written by the same
//! call, and multi-row operations run inside a savepoint, so a failure never
//! leaves a balance change without its audit row (or half a transfer).
//!
//! ## Modules
//!
//! - [`config`] - Limits and fee rates
//! - [`ledger`] - Internal credits and purchase debits
//! - [`deposit`] - Deposit requests and admin approval
//! - [`withdrawal`] - Withdrawals with fee and TDS
//! - [`transfer`] - Member-to-member transfers and top-ups

pub mod config;
pub mod deposit;
pub mod ledger;
pub mod transfer;
pub mod withdrawal;

pub use config::WalletConfig;
pub use deposit::{approve_deposit, deposit_request, reject_deposit};
pub use ledger::{balance, credit_main, credit_main_keyed, debit_for_purchase, history, replay};
pub use transfer::{topup, transfer, TransferReceipt};
pub use withdrawal::{complete_withdrawal, reject_withdrawal, withdraw, WithdrawalQuote};

use gbnet_db::DbError;
use gbnet_types::ledger::TxStatus;
use gbnet_types::Paise;

/// Platform fee type for transfer tax.
pub const FEE_TRANSFER_TAX: &str = "transfer_tax";

/// Platform fee type for the withdrawal processing fee.
pub const FEE_WITHDRAWAL_PROCESSING: &str = "withdrawal_processing";

/// Platform fee type for tax deducted at source on withdrawals.
pub const FEE_WITHDRAWAL_TDS: &str = "withdrawal_tds";

/// Error types for wallet operations.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// The amount is zero or otherwise unusable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Below the configured minimum.
    #[error("amount {amount} below minimum {minimum}")]
    BelowMinimum { amount: Paise, minimum: Paise },

    /// Above the configured maximum.
    #[error("amount {amount} above maximum {maximum}")]
    AboveMaximum { amount: Paise, maximum: Paise },

    /// The balance cannot cover the debit.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Paise, required: Paise },

    /// Withdrawals need approved KYC.
    #[error("KYC not approved for {0}")]
    KycNotApproved(String),

    /// Sender and recipient are the same user.
    #[error("cannot transfer to yourself")]
    SelfTransfer,

    /// The recipient code does not resolve.
    #[error("recipient not found: {0}")]
    RecipientNotFound(String),

    /// The account is blocked.
    #[error("account {0} is blocked")]
    AccountBlocked(String),

    /// The user code does not exist.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The transaction id does not exist or is of another type.
    #[error("transaction not found: {0}")]
    TransactionNotFound(i64),

    /// The transaction was already settled.
    #[error("transaction {id} is {status}, not pending")]
    NotPending { id: i64, status: TxStatus },

    /// The request key was used for a different operation.
    #[error("request key {0} already used for another operation")]
    RequestKeyConflict(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in wallet calculation")]
    Overflow,

    /// Database error.
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

/// Convenience result type for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

/// Fetch an active user or fail.
pub(crate) fn require_active_user(
    conn: &rusqlite::Connection,
    user_code: &str,
) -> Result<gbnet_types::User> {
    let user = gbnet_db::queries::users::find(conn, user_code)?
        .ok_or_else(|| WalletError::UserNotFound(user_code.to_string()))?;
    if !user.is_active {
        return Err(WalletError::AccountBlocked(user.user_code));
    }
    Ok(user)
}

/// Convert an amount to the signed column type.
pub(crate) fn signed(amount: Paise) -> Result<i64> {
    i64::try_from(amount).map_err(|_| WalletError::Overflow)
}

#[cfg(test)]
pub(crate) mod testutil {
    use gbnet_db::queries::{users, wallet};
    use gbnet_types::ledger::WalletBucket;
    use gbnet_types::{KycStatus, Side};
    use rusqlite::Connection;

    /// Two users, GB00001 (root) and GB00002 (left child), with empty wallets.
    pub fn two_users() -> Connection {
        let conn = gbnet_db::open_memory().expect("open test db");
        for (code, sponsor) in [("GB00001", None), ("GB00002", Some(("GB00001", Side::Left)))] {
            users::insert(&conn, code, code, &format!("{code}@example.com"), &format!("R{code}"), 1)
                .expect("insert user");
            users::set_placement(&conn, code, sponsor, 1).expect("place");
            wallet::create(&conn, code, 1).expect("wallet");
        }
        conn
    }

    pub fn fund(conn: &Connection, code: &str, bucket: WalletBucket, amount: i64) {
        wallet::adjust(conn, code, bucket, amount, 1)
            .expect("adjust")
            .expect("applied");
    }

    pub fn approve_kyc(conn: &Connection, code: &str) {
        users::set_kyc_status(conn, code, KycStatus::Approved).expect("kyc");
    }
}
