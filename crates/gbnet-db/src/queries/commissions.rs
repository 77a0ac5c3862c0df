//! Commission settlement records.

use gbnet_types::ledger::CommissionRecord;
use gbnet_types::Paise;
use rusqlite::{Connection, OptionalExtension};

use crate::{get_u64, parse_column, to_i64, Result};

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommissionRecord> {
    Ok(CommissionRecord {
        bv_entry_id: row.get(0)?,
        user_code: row.get(1)?,
        level: row.get(2)?,
        bv_amount: get_u64(row, 3)?,
        percentage_bps: row.get(4)?,
        required_directs: row.get(5)?,
        directs_at_payout: row.get(6)?,
        amount: get_u64(row, 7)?,
        status: parse_column(8, row.get(8)?)?,
        created_at: get_u64(row, 9)?,
    })
}

/// Insert a settlement record. Fails on a second record for the same entry.
pub fn insert(conn: &Connection, record: &CommissionRecord, wallet_tx_id: Option<i64>) -> Result<()> {
    conn.execute(
        "INSERT INTO commissions
             (bv_entry_id, user_code, level, bv_amount, percentage_bps, required_directs,
              directs_at_payout, amount, status, wallet_tx_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            record.bv_entry_id,
            record.user_code,
            record.level,
            to_i64(record.bv_amount)?,
            record.percentage_bps,
            record.required_directs,
            record.directs_at_payout,
            to_i64(record.amount)?,
            record.status.as_str(),
            wallet_tx_id,
            to_i64(record.created_at)?,
        ],
    )?;
    Ok(())
}

/// The settlement for a BV entry, if it has been settled.
pub fn get_by_entry(conn: &Connection, bv_entry_id: i64) -> Result<Option<CommissionRecord>> {
    Ok(conn
        .query_row(
            "SELECT bv_entry_id, user_code, level, bv_amount, percentage_bps, required_directs,
                    directs_at_payout, amount, status, created_at
             FROM commissions WHERE bv_entry_id = ?1",
            [bv_entry_id],
            map_record,
        )
        .optional()?)
}

/// Paid totals per level for a user, ascending by level.
pub fn paid_by_level(conn: &Connection, user_code: &str) -> Result<Vec<(u8, Paise)>> {
    let mut stmt = conn.prepare(
        "SELECT level, SUM(amount) FROM commissions
         WHERE user_code = ?1 AND status = 'paid'
         GROUP BY level ORDER BY level",
    )?;
    let rows = stmt
        .query_map([user_code], |row| Ok((row.get::<_, u8>(0)?, get_u64(row, 1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Recent settlements for a user, newest first.
pub fn recent(conn: &Connection, user_code: &str, limit: u32) -> Result<Vec<CommissionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT bv_entry_id, user_code, level, bv_amount, percentage_bps, required_directs,
                directs_at_payout, amount, status, created_at
         FROM commissions WHERE user_code = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![user_code, limit], map_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
