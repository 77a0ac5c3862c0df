//! # gbnet-engine
//!
//! Request-level operations of the compensation plan.
//!
//! Each mutating operation runs as one `IMMEDIATE` SQLite transaction: the
//! wallet debit, the order, every BV entry, every commission and every STK
//! credit of a purchase commit together or not at all. Callers pass an
//! explicit [`Session`]; nothing here reads ambient identity.
//!
//! ## Modules
//!
//! - [`config`] - Compensation settings
//! - [`members`] - Registration and member read models
//! - [`purchase`] - Product purchases
//! - [`money`] - Wallet and STK requests
//! - [`admin`] - Admin-only operations
//! - [`maintenance`] - Daily sweeps and monthly salary runs

pub mod admin;
pub mod config;
pub mod maintenance;
pub mod members;
pub mod money;
pub mod purchase;

pub use config::EngineConfig;
pub use maintenance::{
    due_salary_period, pay_salaries, previous_period, run_daily_maintenance, MaintenanceReport, Period,
    SalaryRunReport,
};
pub use members::{dashboard_summary, eligibility, rank, register_user, team, RankView, TeamView};
pub use money::{sell_stk, submit_deposit, submit_topup, submit_transfer, submit_withdrawal, StkSale};
pub use purchase::{list_products, submit_purchase, PurchaseReceipt};

use gbnet_bv::BvError;
use gbnet_commission::CommissionError;
use gbnet_db::DbError;
use gbnet_salary::SalaryError;
use gbnet_stk::StkError;
use gbnet_tree::TreeError;
use gbnet_types::Session;
use gbnet_wallet::WalletError;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Error types for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The session may not perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("account {0} is blocked")]
    AccountBlocked(String),

    #[error("product {0} not found")]
    ProductNotFound(i64),

    #[error("product {0} is not for sale")]
    ProductInactive(i64),

    /// A request key was reused for a different operation or user.
    #[error("request key {0:?} already used")]
    RequestKeyConflict(String),

    /// Configuration rejected at startup.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Bv(#[from] BvError),

    #[error(transparent)]
    Commission(#[from] CommissionError),

    #[error(transparent)]
    Salary(#[from] SalaryError),

    #[error(transparent)]
    Stk(#[from] StkError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Coarse classification of an [`EngineError`] for the request boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself is wrong; retrying it unchanged fails again.
    Validation,
    /// The request is well-formed but current state does not allow it.
    StateConflict,
    /// The database was busy; the whole request may be retried.
    Transient,
    Forbidden,
    Internal,
}

fn db_kind(err: &DbError) -> ErrorKind {
    match err {
        DbError::Busy(_) => ErrorKind::Transient,
        DbError::NotFound(_) => ErrorKind::Validation,
        DbError::Constraint(_) => ErrorKind::StateConflict,
        _ => ErrorKind::Internal,
    }
}

fn tree_kind(err: &TreeError) -> ErrorKind {
    match err {
        TreeError::UserNotFound(_)
        | TreeError::SponsorNotFound(_)
        | TreeError::InvalidProfile(_) => ErrorKind::Validation,
        TreeError::SponsorInactive(_)
        | TreeError::SlotOccupied { .. }
        | TreeError::AlreadyPlaced(_)
        | TreeError::CycleDetected { .. }
        | TreeError::EmailTaken(_) => ErrorKind::StateConflict,
        TreeError::ReferralCodeExhausted => ErrorKind::Internal,
        TreeError::Db(e) => db_kind(e),
    }
}

fn wallet_kind(err: &WalletError) -> ErrorKind {
    match err {
        WalletError::InvalidAmount(_)
        | WalletError::BelowMinimum { .. }
        | WalletError::AboveMaximum { .. }
        | WalletError::SelfTransfer
        | WalletError::RecipientNotFound(_)
        | WalletError::UserNotFound(_)
        | WalletError::TransactionNotFound(_) => ErrorKind::Validation,
        WalletError::InsufficientBalance { .. }
        | WalletError::KycNotApproved(_)
        | WalletError::AccountBlocked(_)
        | WalletError::NotPending { .. }
        | WalletError::RequestKeyConflict(_) => ErrorKind::StateConflict,
        WalletError::Overflow => ErrorKind::Internal,
        WalletError::Db(e) => db_kind(e),
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::InvalidRequest(_)
            | EngineError::UserNotFound(_)
            | EngineError::ProductNotFound(_)
            | EngineError::InvalidConfig(_) => ErrorKind::Validation,
            EngineError::AccountBlocked(_)
            | EngineError::ProductInactive(_)
            | EngineError::RequestKeyConflict(_) => ErrorKind::StateConflict,
            EngineError::Overflow => ErrorKind::Internal,
            EngineError::Tree(e) => tree_kind(e),
            EngineError::Bv(e) => match e {
                BvError::InvalidPurchase(_) | BvError::InvalidDecayTable(_) => {
                    ErrorKind::Validation
                }
                BvError::DuplicatePurchase(_) => ErrorKind::StateConflict,
                BvError::Overflow => ErrorKind::Internal,
                BvError::Tree(e) => tree_kind(e),
                BvError::Db(e) => db_kind(e),
            },
            EngineError::Commission(e) => match e {
                CommissionError::InvalidLevelTable(_) => ErrorKind::Validation,
                CommissionError::UnknownLevel(_) | CommissionError::Overflow => {
                    ErrorKind::Internal
                }
                CommissionError::Tree(e) => tree_kind(e),
                CommissionError::Wallet(e) => wallet_kind(e),
                CommissionError::Db(e) => db_kind(e),
            },
            EngineError::Salary(e) => match e {
                SalaryError::InvalidSlabTable(_) | SalaryError::InvalidPeriod(_) => {
                    ErrorKind::Validation
                }
                SalaryError::Overflow => ErrorKind::Internal,
                SalaryError::Tree(e) => tree_kind(e),
                SalaryError::Wallet(e) => wallet_kind(e),
                SalaryError::Db(e) => db_kind(e),
            },
            EngineError::Stk(e) => match e {
                StkError::InvalidAmount(_)
                | StkError::NotACredit(_)
                | StkError::WalletNotFound(_)
                | StkError::InvalidConfig(_) => ErrorKind::Validation,
                StkError::InsufficientAvailableBalance { .. } => ErrorKind::StateConflict,
                StkError::Overflow => ErrorKind::Internal,
                StkError::Db(e) => db_kind(e),
            },
            EngineError::Wallet(e) => wallet_kind(e),
            EngineError::Db(e) => db_kind(e),
        }
    }
}

/// Fail unless the session is an admin.
pub fn require_admin(session: &Session) -> Result<()> {
    if session.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "{} is not an admin",
            session.user_code
        )))
    }
}

/// Fail unless the session may read `user_code`'s data: its own, or any
/// member's for an admin.
pub fn authorize_view(session: &Session, user_code: &str) -> Result<()> {
    if session.is_admin() || session.user_code == user_code {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "{} may not view {user_code}",
            session.user_code
        )))
    }
}

/// Fetch the session's user and require an active account.
pub(crate) fn require_active(conn: &Connection, session: &Session) -> Result<gbnet_types::User> {
    let user = gbnet_db::queries::users::find(conn, &session.user_code)?
        .ok_or_else(|| EngineError::UserNotFound(session.user_code.clone()))?;
    if !user.is_active {
        return Err(EngineError::AccountBlocked(user.user_code));
    }
    Ok(user)
}

/// Run `f` in one IMMEDIATE transaction, committing only if it succeeds.
pub(crate) fn in_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let tx = gbnet_db::immediate(conn)?;
    let value = f(&tx)?;
    tx.commit().map_err(DbError::from)?;
    Ok(value)
}

#[cfg(test)]
pub(crate) mod testutil {
    use gbnet_db::queries::{commerce, users, wallet};
    use gbnet_tree::Placement;
    use gbnet_types::ledger::WalletBucket;
    use gbnet_types::user::NewUserProfile;
    use gbnet_types::{KycStatus, Side, User};
    use rusqlite::Connection;

    /// 2024-01-15T00:00:00Z
    pub const T0: u64 = 1_705_276_800;

    pub fn db() -> Connection {
        gbnet_db::open_memory().expect("open test db")
    }

    pub fn root(conn: &Connection, name: &str) -> User {
        gbnet_tree::register_user(conn, &profile(name), &Placement::Root, T0).expect("register root")
    }

    pub fn under(conn: &Connection, name: &str, sponsor: &User, side: Side) -> User {
        let placement = Placement::Sponsored {
            referral_code: sponsor.referral_code.clone(),
            side,
        };
        gbnet_tree::register_user(conn, &profile(name), &placement, T0).expect("register")
    }

    fn profile(name: &str) -> NewUserProfile {
        NewUserProfile {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
        }
    }

    pub fn fund(conn: &Connection, code: &str, bucket: WalletBucket, amount: i64) {
        wallet::adjust(conn, code, bucket, amount, T0)
            .expect("adjust")
            .expect("applied");
    }

    pub fn approve_kyc(conn: &Connection, code: &str) {
        users::set_kyc_status(conn, code, KycStatus::Approved).expect("kyc");
    }

    /// Rs 1000 product worth 100 BV and 10 STK, no GST.
    pub fn starter_kit(conn: &Connection) -> i64 {
        commerce::insert_product(conn, "Starter kit", 100_000, 0, 10_000, 10_000_000, T0)
            .expect("product")
    }
}
