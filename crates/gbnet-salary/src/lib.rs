//! # gbnet-salary
//!
//! Balanced BV, salary slabs and ranks.
//!
//! Balanced BV is the smaller of a member's left-leg and right-leg active
//! BV. It selects a salary slab (paid monthly) and, through the highest slab
//! the member has fully completed, a rank. Nothing here is stored: slab and
//! rank are recomputed from the live BV ledger on every read. Only salary
//! payouts are persisted, once per member and month.
//!
//! ## Modules
//!
//! - [`slabs`] - Slab table, slab and rank resolution, eligibility
//! - [`payout`] - Leg volumes and monthly salary payouts

pub mod payout;
pub mod slabs;

pub use payout::{compute_balanced_bv, leg_volumes, pay_monthly_salary, LegVolumes};
pub use slabs::{
    eligibility_check, monthly_salary, resolve_rank, resolve_slab, Eligibility, Rank, SalarySlab,
    SlabPay, SlabTable,
};

use gbnet_db::DbError;
use gbnet_tree::TreeError;
use gbnet_wallet::WalletError;

/// Error types for salary and rank operations.
#[derive(Debug, thiserror::Error)]
pub enum SalaryError {
    /// The slab table is malformed.
    #[error("invalid slab table: {0}")]
    InvalidSlabTable(String),

    /// A salary period is not `YYYY-MM`.
    #[error("invalid salary period: {0:?}")]
    InvalidPeriod(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in salary calculation")]
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

/// Convenience result type for salary operations.
pub type Result<T> = std::result::Result<T, SalaryError>;
