//! STK credits, sells and balances.

use gbnet_db::queries::stk::{self, NewStkTransaction};
use gbnet_db::DbError;
use gbnet_types::ledger::{LotStatus, StkBalance, StkTransaction, StkTxType};
use gbnet_types::{time, MicroStk, Timestamp};
use rusqlite::Connection;

use crate::{Result, StkConfig, StkError};

fn wallet_not_found(user_code: &str) -> impl FnOnce(StkError) -> StkError + '_ {
    move |e| match e {
        StkError::Db(DbError::NotFound(_)) => StkError::WalletNotFound(user_code.to_string()),
        other => other,
    }
}

/// Credit STK.
///
/// Purchase and buy credits go to the available bucket. Reward and referral
/// bonus credits become a locked lot unlocking `config.lock_months` calendar
/// months after `now`.
///
/// # Errors
///
/// - [`StkError::InvalidAmount`] for a zero amount
/// - [`StkError::NotACredit`] for a sell
/// - [`StkError::WalletNotFound`] if the user has no STK wallet
pub fn credit(
    conn: &Connection,
    user_code: &str,
    amount: MicroStk,
    source: StkTxType,
    description: &str,
    now: Timestamp,
    config: &StkConfig,
) -> Result<StkTransaction> {
    if amount == 0 {
        return Err(StkError::InvalidAmount("credit of zero".to_string()));
    }
    let (lot_status, unlock_at) = if source.is_immediate_credit() {
        (LotStatus::None, None)
    } else if source.is_locked_credit() {
        let unlock_at = time::add_months(now, config.lock_months).ok_or(StkError::Overflow)?;
        (LotStatus::Locked, Some(unlock_at))
    } else {
        return Err(StkError::NotACredit(source));
    };

    let tx = NewStkTransaction {
        user_code,
        tx_type: source,
        amount,
        lot_status,
        unlock_at,
        description,
        request_key: None,
        created_at: now,
    };
    let id = gbnet_db::with_savepoint(conn, "stk_credit", |conn| {
        match lot_status {
            LotStatus::Locked => stk::add_locked(conn, user_code, amount, now)?,
            _ => stk::add_available(conn, user_code, amount, now)?,
        }
        Ok::<_, StkError>(stk::insert_transaction(conn, &tx)?)
    })
    .map_err(wallet_not_found(user_code))?;

    tracing::info!(
        user = %user_code,
        tx_type = %source,
        amount,
        locked = lot_status == LotStatus::Locked,
        unlock_at,
        "stk credited"
    );
    Ok(stored(id, &tx))
}

/// Debit the available bucket for a sell.
///
/// The locked bucket is never touched, so a sell larger than the available
/// balance fails even when the total would cover it. Nothing changes on
/// failure. A `request_key` is stored on the row, and a second sell under
/// the same key fails on the unique index.
///
/// # Errors
///
/// - [`StkError::InsufficientAvailableBalance`] if `amount` exceeds available
pub fn debit(
    conn: &Connection,
    user_code: &str,
    amount: MicroStk,
    description: &str,
    request_key: Option<&str>,
    now: Timestamp,
) -> Result<StkTransaction> {
    if amount == 0 {
        return Err(StkError::InvalidAmount("sell of zero".to_string()));
    }
    let before = balance(conn, user_code)?;
    let tx = NewStkTransaction {
        user_code,
        tx_type: StkTxType::Sell,
        amount,
        lot_status: LotStatus::None,
        unlock_at: None,
        description,
        request_key,
        created_at: now,
    };
    let id = gbnet_db::with_savepoint(conn, "stk_debit", |conn| -> Result<i64> {
        if !stk::debit_available(conn, user_code, amount, now)? {
            let available = stk::balance(conn, user_code)?.available;
            return Err(StkError::InsufficientAvailableBalance {
                available,
                requested: amount,
            });
        }
        Ok(stk::insert_transaction(conn, &tx)?)
    })?;

    tracing::info!(
        user = %user_code,
        amount,
        available_before = before.available,
        available_after = before.available.saturating_sub(amount),
        "stk sold"
    );
    Ok(stored(id, &tx))
}

/// The sell recorded under `request_key`, if any.
pub fn sale_for_request(conn: &Connection, request_key: &str) -> Result<Option<StkTransaction>> {
    Ok(stk::find_by_request_key(conn, request_key)?
        .filter(|tx| tx.tx_type == StkTxType::Sell))
}

fn stored(id: i64, tx: &NewStkTransaction<'_>) -> StkTransaction {
    StkTransaction {
        id,
        user_code: tx.user_code.to_string(),
        tx_type: tx.tx_type,
        amount: tx.amount,
        lot_status: tx.lot_status,
        unlock_at: tx.unlock_at,
        unlocked_at: None,
        description: tx.description.to_string(),
        created_at: tx.created_at,
    }
}

pub fn balance(conn: &Connection, user_code: &str) -> Result<StkBalance> {
    stk::balance(conn, user_code)
        .map_err(StkError::from)
        .map_err(wallet_not_found(user_code))
}

/// Lots still waiting to unlock, soonest first.
pub fn lots(conn: &Connection, user_code: &str) -> Result<Vec<StkTransaction>> {
    Ok(stk::locked_lots(conn, user_code)?)
}

/// Recent STK ledger rows, newest first.
pub fn history(conn: &Connection, user_code: &str, limit: u32) -> Result<Vec<StkTransaction>> {
    Ok(stk::transactions_for(conn, user_code, limit)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::one_user;
    use gbnet_types::MICRO_STK_PER_STK;

    const STK: u64 = MICRO_STK_PER_STK;
    /// 2024-01-15T00:00:00Z
    const T0: u64 = 1_705_276_800;
    /// 2025-04-15T00:00:00Z
    const T0_PLUS_15_MONTHS: u64 = 1_744_675_200;

    #[test]
    fn test_purchase_credit_is_available() {
        let conn = one_user();
        let tx = credit(&conn, "GB00001", 10 * STK, StkTxType::Purchase, "order", T0, &StkConfig::default())
            .expect("credit");
        assert_eq!(tx.lot_status, LotStatus::None);
        assert_eq!(
            balance(&conn, "GB00001").expect("balance"),
            StkBalance { available: 10 * STK, locked: 0 }
        );
    }

    #[test]
    fn test_reward_creates_locked_lot() {
        let conn = one_user();
        let tx = credit(&conn, "GB00001", 500 * STK, StkTxType::Reward, "reward", T0, &StkConfig::default())
            .expect("credit");
        assert_eq!(tx.lot_status, LotStatus::Locked);
        assert_eq!(tx.unlock_at, Some(T0_PLUS_15_MONTHS));
        assert_eq!(balance(&conn, "GB00001").expect("balance").locked, 500 * STK);
        assert_eq!(lots(&conn, "GB00001").expect("lots"), vec![tx]);
    }

    #[test]
    fn test_sell_never_touches_locked() {
        let conn = one_user();
        let config = StkConfig::default();
        credit(&conn, "GB00001", 100 * STK, StkTxType::Buy, "buy", T0, &config).expect("buy");
        credit(&conn, "GB00001", 500 * STK, StkTxType::Reward, "reward", T0, &config).expect("reward");

        let err = debit(&conn, "GB00001", 150 * STK, "sell", None, T0).expect_err("short");
        assert!(matches!(
            err,
            StkError::InsufficientAvailableBalance { available, requested }
                if available == 100 * STK && requested == 150 * STK
        ));
        assert_eq!(
            balance(&conn, "GB00001").expect("balance"),
            StkBalance { available: 100 * STK, locked: 500 * STK }
        );
        assert_eq!(history(&conn, "GB00001", 10).expect("history").len(), 2);

        debit(&conn, "GB00001", 100 * STK, "sell", None, T0).expect("sell");
        assert_eq!(balance(&conn, "GB00001").expect("balance").available, 0);
    }

    #[test]
    fn test_sell_keeps_request_key() {
        let conn = one_user();
        credit(&conn, "GB00001", 10 * STK, StkTxType::Buy, "buy", T0, &StkConfig::default())
            .expect("buy");
        let sold = debit(&conn, "GB00001", 4 * STK, "sell", Some("s-1"), T0).expect("sell");
        assert_eq!(sale_for_request(&conn, "s-1").expect("lookup"), Some(sold));
        assert!(sale_for_request(&conn, "s-2").expect("lookup").is_none());

        assert!(debit(&conn, "GB00001", 4 * STK, "sell", Some("s-1"), T0).is_err());
        assert_eq!(balance(&conn, "GB00001").expect("balance").available, 6 * STK);
    }

    #[test]
    fn test_sell_is_not_a_credit() {
        let conn = one_user();
        assert!(matches!(
            credit(&conn, "GB00001", STK, StkTxType::Sell, "x", T0, &StkConfig::default()),
            Err(StkError::NotACredit(StkTxType::Sell))
        ));
    }

    #[test]
    fn test_missing_wallet() {
        let conn = one_user();
        assert!(matches!(
            balance(&conn, "GB09999"),
            Err(StkError::WalletNotFound(code)) if code == "GB09999"
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_failed_sell_changes_nothing(
                available in 0u64..1_000_000,
                locked in 1u64..1_000_000,
                extra in 1u64..1_000_000,
            ) {
                let conn = one_user();
                let config = StkConfig::default();
                if available > 0 {
                    credit(&conn, "GB00001", available, StkTxType::Buy, "buy", T0, &config).expect("buy");
                }
                credit(&conn, "GB00001", locked, StkTxType::Reward, "reward", T0, &config).expect("reward");
                let before = balance(&conn, "GB00001").expect("balance");

                let result = debit(&conn, "GB00001", available + extra, "sell", None, T0);
                prop_assert!(
                    matches!(result, Err(StkError::InsufficientAvailableBalance { .. })),
                    "sell above available must fail"
                );
                prop_assert_eq!(balance(&conn, "GB00001").expect("balance"), before);
            }
        }
    }
}
