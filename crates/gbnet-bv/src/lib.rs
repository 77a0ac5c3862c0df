//! # gbnet-bv
//!
//! Business Volume ledger.
//!
//! A purchase of `B` BV creates one entry for each of the buyer's first
//! ten sponsors, level `l` receiving `B * decay[l]`. Entries stay active for
//! six calendar months and are then expired by the daily sweep. Expired
//! entries are kept for history but no longer count toward any total.
//!
//! ## Modules
//!
//! - [`decay`] - Per-level decay table
//! - [`ledger`] - Recording purchases and expiring entries

pub mod decay;
pub mod ledger;

pub use decay::DecayTable;
pub use ledger::{
    active_bv_for, entries_for_purchase, expire_stale_entries, record_purchase, BvConfig,
};

use gbnet_db::DbError;
use gbnet_tree::TreeError;

/// Error types for BV ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum BvError {
    /// The purchase cannot generate BV.
    #[error("invalid purchase: {0}")]
    InvalidPurchase(String),

    /// Entries already exist for this purchase id.
    #[error("purchase {0} already recorded")]
    DuplicatePurchase(String),

    /// The decay table is malformed.
    #[error("invalid decay table: {0}")]
    InvalidDecayTable(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in BV calculation")]
    Overflow,

    /// Sponsor tree error.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Database error.
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

/// Convenience result type for BV operations.
pub type Result<T> = std::result::Result<T, BvError>;
