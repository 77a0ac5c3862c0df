//! Settling BV entries into commission records and wallet credits.

use gbnet_db::queries::{commissions, users};
use gbnet_db::DbError;
use gbnet_tree::DirectPolicy;
use gbnet_types::dashboard::CommissionSummary;
use gbnet_types::ledger::{BvEntry, CommissionRecord, CommissionStatus, WalletTxType};
use gbnet_types::Timestamp;
use rusqlite::Connection;

use crate::{compute_commission, CommissionError, LevelTable, Result};

/// Settle one BV entry.
///
/// The beneficiary's direct count is read now, at payout time. A paid
/// outcome credits the main wallet; an unqualified one is stored with a zero
/// amount so the entry is never looked at again. Settling an entry that
/// already has a record returns that record unchanged.
pub fn settle_entry(
    conn: &Connection,
    entry: &BvEntry,
    policy: DirectPolicy,
    table: &LevelTable,
    now: Timestamp,
) -> Result<CommissionRecord> {
    if let Some(existing) = commissions::get_by_entry(conn, entry.id)? {
        tracing::debug!(bv_entry = entry.id, user = %entry.user_code, "entry already settled");
        return Ok(existing);
    }

    let rule = *table
        .rule(entry.level)
        .ok_or(CommissionError::UnknownLevel(entry.level))?;
    let earner = users::get(conn, &entry.user_code)?;
    let directs = gbnet_tree::direct_referral_count(conn, &entry.user_code, policy)?;
    let amount = if earner.is_active {
        compute_commission(directs, entry, table)?
    } else {
        0
    };
    let qualified = earner.is_active && directs >= rule.required_directs;

    let mut record = CommissionRecord {
        bv_entry_id: entry.id,
        user_code: entry.user_code.clone(),
        level: entry.level,
        bv_amount: entry.amount,
        percentage_bps: rule.percentage_bps,
        required_directs: rule.required_directs,
        directs_at_payout: directs,
        amount: 0,
        status: CommissionStatus::Unqualified,
        created_at: now,
    };

    if !qualified {
        commissions::insert(conn, &record, None)?;
        tracing::debug!(
            bv_entry = entry.id,
            user = %entry.user_code,
            level = entry.level,
            directs,
            required = rule.required_directs,
            active = earner.is_active,
            "commission level locked"
        );
        return Ok(record);
    }

    record.amount = amount;
    record.status = CommissionStatus::Paid;

    gbnet_db::with_savepoint(conn, "settle_entry", |conn| {
        let wallet_tx_id = if amount > 0 {
            let description = format!("L{} commission from {}", entry.level, entry.source_user_code);
            let tx = gbnet_wallet::credit_main(
                conn,
                &entry.user_code,
                amount,
                WalletTxType::Commission,
                &description,
                now,
            )?;
            Some(tx.id)
        } else {
            None
        };
        match commissions::insert(conn, &record, wallet_tx_id) {
            Ok(()) => Ok(()),
            Err(DbError::Constraint(_)) => {
                // settled concurrently; the savepoint drops our credit
                Err(CommissionError::Db(DbError::Constraint(format!(
                    "entry {} settled twice",
                    entry.id
                ))))
            }
            Err(e) => Err(e.into()),
        }
    })?;

    tracing::info!(
        bv_entry = entry.id,
        user = %entry.user_code,
        level = entry.level,
        bv = entry.amount,
        amount,
        "commission paid"
    );
    Ok(record)
}

/// Settle every entry of a purchase, in level order.
pub fn settle_entries(
    conn: &Connection,
    entries: &[BvEntry],
    policy: DirectPolicy,
    table: &LevelTable,
    now: Timestamp,
) -> Result<Vec<CommissionRecord>> {
    entries
        .iter()
        .map(|entry| settle_entry(conn, entry, policy, table, now))
        .collect()
}

/// Paid commission totals for the dashboard.
pub fn commission_totals(conn: &Connection, user_code: &str) -> Result<CommissionSummary> {
    let by_level = commissions::paid_by_level(conn, user_code)?;
    let total_paid = by_level
        .iter()
        .try_fold(0u64, |acc, (_, amount)| acc.checked_add(*amount))
        .ok_or(CommissionError::Overflow)?;
    Ok(CommissionSummary {
        total_paid,
        by_level,
    })
}
