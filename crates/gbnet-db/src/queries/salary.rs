//! Monthly salary payout records.

use gbnet_types::{CentiBv, Paise, Timestamp};
use rusqlite::{Connection, OptionalExtension};

use crate::{get_u64, to_i64, Result};

/// A salary payout row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalaryPayoutRow {
    pub user_code: String,
    pub period: String,
    pub slab_level: u8,
    pub balanced_bv: CentiBv,
    pub amount: Paise,
    pub paid_at: Timestamp,
}

/// Insert a payout. Fails if the user was already paid for the period.
pub fn insert(conn: &Connection, row: &SalaryPayoutRow, wallet_tx_id: Option<i64>) -> Result<()> {
    conn.execute(
        "INSERT INTO salary_payouts
             (user_code, period, slab_level, balanced_bv, amount, wallet_tx_id, paid_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            row.user_code,
            row.period,
            row.slab_level,
            to_i64(row.balanced_bv)?,
            to_i64(row.amount)?,
            wallet_tx_id,
            to_i64(row.paid_at)?,
        ],
    )?;
    Ok(())
}

/// The payout for a user and period, if any.
pub fn get(conn: &Connection, user_code: &str, period: &str) -> Result<Option<SalaryPayoutRow>> {
    Ok(conn
        .query_row(
            "SELECT user_code, period, slab_level, balanced_bv, amount, paid_at
             FROM salary_payouts WHERE user_code = ?1 AND period = ?2",
            rusqlite::params![user_code, period],
            |row| {
                Ok(SalaryPayoutRow {
                    user_code: row.get(0)?,
                    period: row.get(1)?,
                    slab_level: row.get(2)?,
                    balanced_bv: get_u64(row, 3)?,
                    amount: get_u64(row, 4)?,
                    paid_at: get_u64(row, 5)?,
                })
            },
        )
        .optional()?)
}
