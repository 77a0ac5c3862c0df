//! Dashboard summary returned to the UI (`get_dashboard_summary`).

use serde::{Deserialize, Serialize};

use crate::ledger::{StkBalance, WalletBalance};
use crate::{CentiBv, Paise};

/// Everything the member dashboard shows, computed in one read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct DashboardSummary {
    pub user_code: String,
    pub team: TeamCounts,
    pub bv: BvSummary,
    pub salary: SalarySummary,
    pub commissions: CommissionSummary,
    pub wallet: WalletBalance,
    pub stk: StkBalance,
}

/// Downline head-counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct TeamCounts {
    pub left: u64,
    pub right: u64,
    pub total: u64,
    /// Directs counted toward commission unlocks.
    pub qualified_directs: u32,
}

/// Active BV figures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct BvSummary {
    pub left: CentiBv,
    pub right: CentiBv,
    pub balanced: CentiBv,
    /// All active BV credited to the user.
    pub total_active: CentiBv,
}

/// Salary slab, rank and eligibility.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct SalarySummary {
    /// Slab level containing the balanced BV, if any.
    pub slab_level: Option<u8>,
    /// Fixed monthly salary of that slab; `None` for the volume-share slab
    /// or when no slab is reached.
    pub fixed_salary: Option<Paise>,
    pub rank: String,
    pub eligibility: String,
}

/// Commission totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct CommissionSummary {
    pub total_paid: Paise,
    /// `(level, amount)` pairs for levels with any payout.
    pub by_level: Vec<(u8, Paise)>,
}
