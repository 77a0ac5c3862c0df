//! Lot unlock sweep.
//!
//! A lot is unlocked by flipping its status and moving its amount from the
//! locked to the available bucket under one savepoint. The status flip is
//! guarded in SQL (`WHERE lot_status = 'locked'`), so a lot is moved at most
//! once no matter how often or how concurrently the sweep runs, and a sweep
//! interrupted halfway leaves every lot either fully moved or untouched.

use gbnet_db::queries::stk;
use gbnet_types::Timestamp;
use rusqlite::Connection;

use crate::Result;

/// Lots fetched per round.
const SWEEP_BATCH: u32 = 500;

/// Unlock every lot with `unlock_at <= now`. Returns the number unlocked.
pub fn sweep_unlocks(conn: &Connection, now: Timestamp) -> Result<usize> {
    let mut unlocked = 0usize;
    loop {
        let due = stk::due_lots(conn, now, SWEEP_BATCH)?;
        if due.is_empty() {
            break;
        }
        for lot in &due {
            let moved = gbnet_db::with_savepoint(conn, "stk_unlock", |conn| -> Result<bool> {
                if !stk::mark_unlocked(conn, lot.id, now)? {
                    return Ok(false);
                }
                stk::release_locked(conn, &lot.user_code, lot.amount, now)?;
                Ok(true)
            })?;
            if moved {
                unlocked += 1;
                tracing::debug!(lot = lot.id, user = %lot.user_code, amount = lot.amount, "stk lot unlocked");
            } else {
                tracing::debug!(lot = lot.id, "stk lot already unlocked");
            }
        }
        if due.len() < SWEEP_BATCH as usize {
            break;
        }
    }
    if unlocked > 0 {
        tracing::info!(unlocked, now, "stk unlock sweep");
    }
    Ok(unlocked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::one_user;
    use crate::{balance, credit, lots, StkConfig};
    use gbnet_types::ledger::{StkBalance, StkTxType};
    use gbnet_types::MICRO_STK_PER_STK;

    const STK: u64 = MICRO_STK_PER_STK;
    /// 2024-01-15T00:00:00Z
    const T0: u64 = 1_705_276_800;
    /// 2025-04-15T00:00:00Z
    const UNLOCK: u64 = 1_744_675_200;

    fn reward(conn: &Connection, amount: u64, at: u64) {
        credit(conn, "GB00001", amount, StkTxType::Reward, "reward", at, &StkConfig::default())
            .expect("reward");
    }

    #[test]
    fn test_reward_unlocks_after_fifteen_months() {
        let conn = one_user();
        reward(&conn, 500 * STK, T0);

        assert_eq!(sweep_unlocks(&conn, UNLOCK - 1).expect("sweep"), 0);
        assert_eq!(
            balance(&conn, "GB00001").expect("balance"),
            StkBalance { available: 0, locked: 500 * STK }
        );

        assert_eq!(sweep_unlocks(&conn, UNLOCK + 1).expect("sweep"), 1);
        assert_eq!(
            balance(&conn, "GB00001").expect("balance"),
            StkBalance { available: 500 * STK, locked: 0 }
        );
        assert!(lots(&conn, "GB00001").expect("lots").is_empty());
    }

    #[test]
    fn test_sweep_twice_equals_once() {
        let conn = one_user();
        reward(&conn, 10 * STK, T0);
        reward(&conn, 20 * STK, T0 + 86_400);

        let first = sweep_unlocks(&conn, UNLOCK + 2 * 86_400).expect("sweep");
        let after_first = balance(&conn, "GB00001").expect("balance");
        let second = sweep_unlocks(&conn, UNLOCK + 2 * 86_400).expect("sweep again");

        assert_eq!(first, 2);
        assert_eq!(second, 0);
        assert_eq!(balance(&conn, "GB00001").expect("balance"), after_first);
        assert_eq!(after_first.available, 30 * STK);
    }

    #[test]
    fn test_lots_unlock_independently() {
        let conn = one_user();
        reward(&conn, 10 * STK, T0);
        // one month later, so it unlocks one month later too
        reward(&conn, 20 * STK, T0 + 31 * 86_400);

        assert_eq!(sweep_unlocks(&conn, UNLOCK).expect("sweep"), 1);
        assert_eq!(
            balance(&conn, "GB00001").expect("balance"),
            StkBalance { available: 10 * STK, locked: 20 * STK }
        );
        assert_eq!(lots(&conn, "GB00001").expect("lots").len(), 1);
    }
}
