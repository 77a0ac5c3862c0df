//! # gbnet-stk
//!
//! STK token ledger with time-locked lots.
//!
//! Each member has two STK buckets. Purchase and buy credits land in the
//! available bucket. Rewards and referral bonuses become individual lots in
//! the locked bucket and unlock one by one, 15 calendar months after they
//! were credited, when the daily sweep reaches them. Only the available
//! bucket can ever be sold.
//!
//! ## Modules
//!
//! - [`config`] - Lock period, referral bonus and STK price
//! - [`ledger`] - Credits, sells and balances
//! - [`unlock`] - Lot unlock sweep

pub mod config;
pub mod ledger;
pub mod unlock;

pub use config::StkConfig;
pub use ledger::{balance, credit, debit, history, lots, sale_for_request};
pub use unlock::sweep_unlocks;

use gbnet_db::DbError;
use gbnet_types::ledger::StkTxType;
use gbnet_types::MicroStk;

/// Error types for STK operations.
#[derive(Debug, thiserror::Error)]
pub enum StkError {
    /// Zero or otherwise unusable amount.
    #[error("invalid STK amount: {0}")]
    InvalidAmount(String),

    /// A sell asked for more than the available bucket holds.
    #[error("insufficient available STK: {available} available, {requested} requested")]
    InsufficientAvailableBalance {
        /// Available (unlocked) balance.
        available: MicroStk,
        /// Amount asked for.
        requested: MicroStk,
    },

    /// The transaction type is not a credit.
    #[error("{0} is not an STK credit")]
    NotACredit(StkTxType),

    /// No STK wallet for the user.
    #[error("STK wallet not found for {0}")]
    WalletNotFound(String),

    /// Malformed STK configuration.
    #[error("invalid STK config: {0}")]
    InvalidConfig(String),

    /// Arithmetic or calendar overflow.
    #[error("arithmetic overflow in STK calculation")]
    Overflow,

    /// Database error.
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

/// Convenience result type for STK operations.
pub type Result<T> = std::result::Result<T, StkError>;

#[cfg(test)]
pub(crate) mod testutil {
    use gbnet_db::queries::{stk, users};
    use rusqlite::Connection;

    /// One user with an empty STK wallet.
    pub fn one_user() -> Connection {
        let conn = gbnet_db::open_memory().expect("open test db");
        users::insert(&conn, "GB00001", "a", "a@example.com", "RA", 1).expect("insert user");
        users::set_placement(&conn, "GB00001", None, 1).expect("place");
        stk::create(&conn, "GB00001", 1).expect("stk wallet");
        conn
    }
}
