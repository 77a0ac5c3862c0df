//! Leg volumes, balanced BV and monthly salary payouts.

use gbnet_db::queries::{salary, users};
use gbnet_db::queries::salary::SalaryPayoutRow;
use gbnet_types::ledger::WalletTxType;
use gbnet_types::{CentiBv, Paise, Side, Timestamp};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::slabs::{format_bv, monthly_salary, resolve_slab, SlabTable};
use crate::{Result, SalaryError};

/// Active BV on each side of a member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegVolumes {
    pub left: CentiBv,
    pub right: CentiBv,
}

impl LegVolumes {
    /// The weaker leg.
    pub fn balanced(&self) -> CentiBv {
        self.left.min(self.right)
    }
}

pub fn leg_volumes(conn: &Connection, user_code: &str) -> Result<LegVolumes> {
    Ok(LegVolumes {
        left: gbnet_tree::subtree_bv(conn, user_code, Side::Left)?,
        right: gbnet_tree::subtree_bv(conn, user_code, Side::Right)?,
    })
}

/// Balanced BV of a member, read from the live ledger.
pub fn compute_balanced_bv(conn: &Connection, user_code: &str) -> Result<CentiBv> {
    Ok(leg_volumes(conn, user_code)?.balanced())
}

fn validate_period(period: &str) -> Result<()> {
    let invalid = || SalaryError::InvalidPeriod(period.to_string());
    let (year, month) = period.split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.len() != 2 {
        return Err(invalid());
    }
    if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match month.parse::<u8>() {
        Ok(1..=12) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Pay a member's salary for `period` (`YYYY-MM`).
///
/// Returns the stored payout, or `None` when nothing is owed: no slab
/// reached, a zero amount, or a blocked account. Paying a period twice
/// returns the first payout without crediting again.
pub fn pay_monthly_salary(
    conn: &Connection,
    user_code: &str,
    period: &str,
    cto_volume: Paise,
    table: &SlabTable,
    now: Timestamp,
) -> Result<Option<SalaryPayoutRow>> {
    validate_period(period)?;
    if let Some(existing) = salary::get(conn, user_code, period)? {
        tracing::debug!(user = %user_code, period, "salary already paid");
        return Ok(Some(existing));
    }

    let member = users::get(conn, user_code)?;
    if !member.is_active {
        tracing::debug!(user = %user_code, period, "salary skipped for blocked account");
        return Ok(None);
    }

    let balanced = compute_balanced_bv(conn, user_code)?;
    let Some(slab) = resolve_slab(balanced, table) else {
        return Ok(None);
    };
    let amount = monthly_salary(slab, cto_volume)?;
    if amount == 0 {
        return Ok(None);
    }

    let row = SalaryPayoutRow {
        user_code: user_code.to_string(),
        period: period.to_string(),
        slab_level: slab.level,
        balanced_bv: balanced,
        amount,
        paid_at: now,
    };
    gbnet_db::with_savepoint(conn, "pay_salary", |conn| {
        let description = format!("{} salary for {period}", slab.name);
        let tx = gbnet_wallet::credit_main(
            conn,
            user_code,
            amount,
            WalletTxType::Salary,
            &description,
            now,
        )?;
        salary::insert(conn, &row, Some(tx.id))?;
        Ok::<_, SalaryError>(())
    })?;

    tracing::info!(
        user = %user_code,
        period,
        slab = slab.level,
        balanced = %format_bv(balanced),
        amount,
        "salary paid"
    );
    Ok(Some(row))
}
