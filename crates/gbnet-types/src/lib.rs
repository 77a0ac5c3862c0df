//! # gbnet-types
//!
//! Shared domain types used across the GBNet workspace.
//!
//! ## Units
//!
//! - Money is integer paise ([`Paise`], 100 paise = 1 rupee).
//! - Business Volume is integer centi-BV ([`CentiBv`], 100 = 1 BV). One BV
//!   is worth one rupee when commissions are computed, so a centi-BV amount
//!   scaled by a percentage is already in paise.
//! - STK is integer micro-STK ([`MicroStk`], 1_000_000 = 1 STK).
//! - Timestamps are Unix epoch seconds ([`Timestamp`]).
//! - Percentages are basis points ([`Bps`], 10_000 = 100%).

pub mod dashboard;
pub mod ledger;
pub mod session;
pub mod time;
pub mod user;

pub use session::{Role, Session};
pub use user::{KycStatus, Side, User};

/// Integer paise.
pub type Paise = u64;

/// Integer hundredths of a BV point.
pub type CentiBv = u64;

/// Integer millionths of an STK token.
pub type MicroStk = u64;

/// Unix epoch seconds.
pub type Timestamp = u64;

/// Basis points.
pub type Bps = u16;

/// Paise per rupee.
pub const PAISE_PER_RUPEE: u64 = 100;

/// Centi-BV per BV point.
pub const CENTI_BV_PER_BV: u64 = 100;

/// Micro-STK per STK.
pub const MICRO_STK_PER_STK: u64 = 1_000_000;

/// Basis-point denominator (100%).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Maximum number of sponsor levels BV propagates through.
pub const MAX_BV_LEVELS: usize = 10;

/// Default BV retention window in calendar months.
pub const BV_RETENTION_MONTHS: u32 = 6;

/// Lock period for non-purchase STK credits in calendar months.
pub const STK_LOCK_MONTHS: u32 = 15;

/// Prefix of human-readable user codes.
pub const USER_CODE_PREFIX: &str = "GB";

/// Format a sequential user number as a user code, e.g. `GB00001`.
pub fn format_user_code(seq: u64) -> String {
    format!("{USER_CODE_PREFIX}{seq:05}")
}

/// Apply a basis-point rate to an amount, rounding down.
///
/// Returns `None` on overflow.
pub fn apply_bps(amount: u64, bps: Bps) -> Option<u64> {
    amount
        .checked_mul(u64::from(bps))
        .map(|scaled| scaled / BPS_DENOMINATOR)
}

/// Error returned when a stored or wire string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    /// The enum being parsed.
    pub kind: &'static str,
    /// The offending input.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
