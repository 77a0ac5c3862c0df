//! # gbnet-commission
//!
//! Level commissions on BV entries.
//!
//! Each BV entry pays its beneficiary a level-dependent percentage of the
//! entry amount, but only once the beneficiary has enough direct referrals
//! to unlock that level. The unlock is evaluated when the entry is settled
//! and the outcome is stored; a level unlocked later never pays for entries
//! that were already settled as unqualified.
//!
//! ## Modules
//!
//! - [`levels`] - Level table and the pure commission formula
//! - [`settlement`] - Settling entries into the wallet

pub mod levels;
pub mod settlement;

pub use levels::{compute_commission, LevelRule, LevelTable};
pub use settlement::{commission_totals, settle_entries, settle_entry};

use gbnet_db::DbError;
use gbnet_tree::TreeError;
use gbnet_wallet::WalletError;

/// Error types for commission operations.
#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    /// The level table is malformed.
    #[error("invalid level table: {0}")]
    InvalidLevelTable(String),

    /// The entry's level has no rule.
    #[error("no commission rule for level {0}")]
    UnknownLevel(u8),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in commission calculation")]
    Overflow,

    /// Sponsor tree error.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Wallet error while crediting.
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Database error.
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

/// Convenience result type for commission operations.
pub type Result<T> = std::result::Result<T, CommissionError>;
