//! Daily sweeps and the monthly salary run.
//!
//! Both jobs are safe to repeat. The daily sweep only moves rows whose time
//! has come, and salary payouts are keyed by `(user, period)`, so a run that
//! stops halfway is finished by running it again.

use gbnet_db::queries::{commerce, salary, settings, users};
use gbnet_db::DbError;
use gbnet_types::time::{month_range, period_key};
use gbnet_types::{Paise, Timestamp};
use rusqlite::Connection;
use serde::Serialize;

use crate::{in_transaction, EngineConfig, EngineError, Result};

/// What one daily sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub bv_expired: usize,
    pub lots_unlocked: usize,
}

/// Expire stale BV entries and unlock due STK lots.
///
/// Each lot commits on its own, so a failure partway through keeps the lots
/// already unlocked.
pub fn run_daily_maintenance(conn: &Connection, now: Timestamp) -> Result<MaintenanceReport> {
    let bv_expired = gbnet_bv::expire_stale_entries(conn, now)?;
    let lots_unlocked = gbnet_stk::sweep_unlocks(conn, now)?;
    settings::set(conn, settings::LAST_MAINTENANCE_AT, &now.to_string())?;

    let report = MaintenanceReport {
        bv_expired,
        lots_unlocked,
    };
    tracing::info!(bv_expired, lots_unlocked, now, "daily maintenance finished");
    Ok(report)
}

/// A closed salary period: its `YYYY-MM` key and `[start, end)` bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Period {
    pub key: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// The calendar month before the one containing `now`.
pub fn previous_period(now: Timestamp) -> Result<Period> {
    let (this_month, _) = month_range(now).ok_or(EngineError::Overflow)?;
    let last_second = this_month.checked_sub(1).ok_or(EngineError::Overflow)?;
    let (start, end) = month_range(last_second).ok_or(EngineError::Overflow)?;
    Ok(Period {
        key: period_key(last_second),
        start,
        end,
    })
}

/// The previous period if its salary run has not finished yet.
pub fn due_salary_period(conn: &Connection, now: Timestamp) -> Result<Option<Period>> {
    let period = previous_period(now)?;
    match settings::get(conn, settings::LAST_SALARY_PERIOD) {
        Ok(last) if last >= period.key => Ok(None),
        Ok(_) | Err(DbError::NotFound(_)) => Ok(Some(period)),
        Err(e) => Err(e.into()),
    }
}

/// Totals of one salary run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SalaryRunReport {
    pub period: String,
    /// Completed-order turnover of the period, the base of CTO shares.
    pub cto_volume: Paise,
    /// Members credited by this run.
    pub members_paid: usize,
    /// Members an earlier, interrupted run had already paid.
    pub already_paid: usize,
    /// Sum credited by this run only.
    pub total_paid: Paise,
}

/// Pay every active member's salary for the month before `now`.
///
/// Each member is paid in their own transaction. Members already paid for
/// the period are not credited again and count under `already_paid`, never
/// in `members_paid` or `total_paid`. The period is recorded as
/// finished only when every member succeeded.
pub fn pay_salaries(
    conn: &mut Connection,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<SalaryRunReport> {
    let period = previous_period(now)?;
    let cto_volume = commerce::turnover_between(conn, period.start, period.end)?;
    let mut report = SalaryRunReport {
        period: period.key.clone(),
        cto_volume,
        ..SalaryRunReport::default()
    };

    for user_code in users::active_codes(conn)? {
        let (earlier, paid) = in_transaction(conn, |conn| {
            let earlier = salary::get(conn, &user_code, &period.key)?.is_some();
            let paid = gbnet_salary::pay_monthly_salary(
                conn,
                &user_code,
                &period.key,
                cto_volume,
                &config.slabs,
                now,
            )?;
            Ok((earlier, paid))
        })?;
        match paid {
            Some(_) if earlier => report.already_paid += 1,
            Some(payout) => {
                report.members_paid += 1;
                report.total_paid = report
                    .total_paid
                    .checked_add(payout.amount)
                    .ok_or(EngineError::Overflow)?;
            }
            None => {}
        }
    }

    settings::set(conn, settings::LAST_SALARY_PERIOD, &period.key)?;
    tracing::info!(
        period = %report.period,
        cto_volume,
        members_paid = report.members_paid,
        already_paid = report.already_paid,
        total_paid = report.total_paid,
        "salary run finished"
    );
    Ok(report)
}
