//! Member wallet requests and STK sells.
//!
//! Every request acts on the session's own account. The wallet crate owns
//! the rules (limits, fees, KYC); this module adds the session check and the
//! transaction boundary.

use gbnet_types::ledger::{StkTransaction, WalletTransaction, WalletTxType};
use gbnet_types::{MicroStk, Paise, Session, Timestamp};
use gbnet_wallet::TransferReceipt;
use rusqlite::Connection;
use serde::Serialize;

use crate::{in_transaction, require_active, EngineConfig, EngineError, Result};

/// Request a withdrawal of `gross` from the main balance.
///
/// The debit is taken now and the row stays pending until an admin
/// completes or rejects it.
pub fn submit_withdrawal(
    conn: &mut Connection,
    session: &Session,
    gross: Paise,
    request_key: Option<&str>,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<WalletTransaction> {
    in_transaction(conn, |conn| {
        let user = require_active(conn, session)?;
        Ok(gbnet_wallet::withdraw(conn, &user.user_code, gross, request_key, now, &config.wallet)?)
    })
}

/// Send `amount` to another member. The sender also pays the transfer tax.
pub fn submit_transfer(
    conn: &mut Connection,
    session: &Session,
    recipient_code: &str,
    amount: Paise,
    request_key: Option<&str>,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<TransferReceipt> {
    in_transaction(conn, |conn| {
        let user = require_active(conn, session)?;
        Ok(gbnet_wallet::transfer(
            conn,
            &user.user_code,
            recipient_code,
            amount,
            request_key,
            now,
            &config.wallet,
        )?)
    })
}

/// Move `amount` from main to top-up.
pub fn submit_topup(
    conn: &mut Connection,
    session: &Session,
    amount: Paise,
    request_key: Option<&str>,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<(WalletTransaction, WalletTransaction)> {
    in_transaction(conn, |conn| {
        let user = require_active(conn, session)?;
        Ok(gbnet_wallet::topup(conn, &user.user_code, amount, request_key, now, &config.wallet)?)
    })
}

/// Record a pending deposit against an external payment reference.
pub fn submit_deposit(
    conn: &mut Connection,
    session: &Session,
    amount: Paise,
    reference: &str,
    request_key: Option<&str>,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<WalletTransaction> {
    if reference.trim().is_empty() {
        return Err(EngineError::InvalidRequest("payment reference is required".to_string()));
    }
    in_transaction(conn, |conn| {
        let user = require_active(conn, session)?;
        Ok(gbnet_wallet::deposit_request(
            conn,
            &user.user_code,
            amount,
            reference.trim(),
            request_key,
            now,
            &config.wallet,
        )?)
    })
}

/// Both legs of an STK sell.
#[derive(Clone, Debug, Serialize)]
pub struct StkSale {
    pub stk_tx: StkTransaction,
    /// Main-balance credit for the sale value.
    pub wallet_tx: WalletTransaction,
    /// True when a retried `request_key` returned the earlier sale.
    pub replayed: bool,
}

/// Sell `amount` available STK at the configured price.
///
/// The STK debit and the wallet credit commit together. Locked STK is never
/// sold. Both rows carry `request_key`, so a retry returns the first sale
/// without moving either balance again.
pub fn sell_stk(
    conn: &mut Connection,
    session: &Session,
    amount: MicroStk,
    request_key: Option<&str>,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<StkSale> {
    let value = config.stk.sale_value(amount)?;
    if value == 0 {
        return Err(EngineError::InvalidRequest(format!(
            "{amount} micro-STK is worth less than one paisa"
        )));
    }
    in_transaction(conn, |conn| {
        let user = require_active(conn, session)?;
        if let Some(sale) = replay_sale(conn, &user.user_code, amount, value, request_key)? {
            return Ok(sale);
        }
        let description = format!("Sold {}", format_stk(amount));
        let stk_tx =
            gbnet_stk::debit(conn, &user.user_code, amount, &description, request_key, now)?;
        let wallet_tx = gbnet_wallet::credit_main_keyed(
            conn,
            &user.user_code,
            value,
            WalletTxType::StkSale,
            &description,
            request_key,
            now,
        )?;
        tracing::info!(user = %user.user_code, amount, value, "stk sale settled");
        Ok(StkSale {
            stk_tx,
            wallet_tx,
            replayed: false,
        })
    })
}

fn replay_sale(
    conn: &Connection,
    user_code: &str,
    amount: MicroStk,
    value: Paise,
    request_key: Option<&str>,
) -> Result<Option<StkSale>> {
    let Some(key) = request_key else {
        return Ok(None);
    };
    let sale = WalletTxType::StkSale;
    let Some(wallet_tx) = gbnet_wallet::replay(conn, Some(key), user_code, sale, value, None)? else {
        return Ok(None);
    };
    let stk_tx = gbnet_stk::sale_for_request(conn, key)?
        .filter(|tx| tx.user_code == user_code && tx.amount == amount)
        .ok_or_else(|| EngineError::RequestKeyConflict(key.to_string()))?;
    tracing::debug!(user = %user_code, stk_tx = stk_tx.id, "stk sale replayed");
    Ok(Some(StkSale {
        stk_tx,
        wallet_tx,
        replayed: true,
    }))
}

fn format_stk(amount: MicroStk) -> String {
    let whole = amount / gbnet_types::MICRO_STK_PER_STK;
    let frac = amount % gbnet_types::MICRO_STK_PER_STK;
    if frac == 0 {
        format!("{whole} STK")
    } else {
        format!("{whole}.{frac:06} STK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{approve_kyc, db, fund, root, under, T0};
    use gbnet_db::queries::{stk, wallet};
    use gbnet_types::ledger::{StkTxType, TxStatus, WalletBucket};
    use gbnet_types::{Side, MICRO_STK_PER_STK};

    #[test]
    fn test_transfer_charges_tax() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let b = under(&conn, "Bala", &a, Side::Left);
        fund(&conn, &a.user_code, WalletBucket::Main, 150_000);

        let receipt = submit_transfer(
            &mut conn,
            &Session::member(&a.user_code),
            &b.user_code,
            100_000,
            None,
            T0,
            &EngineConfig::default(),
        )
        .expect("transfer");
        assert_eq!(receipt.tax, 8_000);
        assert_eq!(wallet::balance(&conn, &a.user_code).expect("a").main_balance, 42_000);
        assert_eq!(wallet::balance(&conn, &b.user_code).expect("b").main_balance, 100_000);
    }

    #[test]
    fn test_withdrawal_needs_kyc() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        fund(&conn, &a.user_code, WalletBucket::Main, 200_000);
        let session = Session::member(&a.user_code);
        let config = EngineConfig::default();

        let err = submit_withdrawal(&mut conn, &session, 100_000, None, T0, &config)
            .expect_err("no kyc");
        assert!(matches!(
            err,
            EngineError::Wallet(gbnet_wallet::WalletError::KycNotApproved(_))
        ));

        approve_kyc(&conn, &a.user_code);
        let tx = submit_withdrawal(&mut conn, &session, 100_000, Some("w1"), T0, &config)
            .expect("withdraw");
        assert_eq!(tx.status, TxStatus::Pending);
        let again = submit_withdrawal(&mut conn, &session, 100_000, Some("w1"), T0, &config)
            .expect("replay");
        assert_eq!(again.id, tx.id);
        assert_eq!(wallet::balance(&conn, &a.user_code).expect("a").main_balance, 100_000);
    }

    #[test]
    fn test_blocked_member_rejected() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        fund(&conn, &a.user_code, WalletBucket::Main, 200_000);
        gbnet_db::queries::users::set_active(&conn, &a.user_code, false).expect("block");
        assert!(matches!(
            submit_topup(
                &mut conn,
                &Session::member(&a.user_code),
                50_000,
                None,
                T0,
                &EngineConfig::default()
            ),
            Err(EngineError::AccountBlocked(_))
        ));
    }

    #[test]
    fn test_deposit_needs_reference() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let session = Session::member(&a.user_code);
        assert!(matches!(
            submit_deposit(&mut conn, &session, 100_000, "  ", None, T0, &EngineConfig::default()),
            Err(EngineError::InvalidRequest(_))
        ));
        let tx = submit_deposit(&mut conn, &session, 100_000, "UTR123", None, T0, &EngineConfig::default())
            .expect("deposit");
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(wallet::balance(&conn, &a.user_code).expect("a").main_balance, 0);
    }

    #[test]
    fn test_sell_stk_credits_wallet() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let config = EngineConfig::default();
        gbnet_stk::credit(&conn, &a.user_code, 20 * MICRO_STK_PER_STK, StkTxType::Buy, "buy", T0, &config.stk)
            .expect("buy");
        gbnet_stk::credit(&conn, &a.user_code, 50 * MICRO_STK_PER_STK, StkTxType::Reward, "reward", T0, &config.stk)
            .expect("reward");
        let session = Session::member(&a.user_code);

        let sale = sell_stk(&mut conn, &session, 15 * MICRO_STK_PER_STK, None, T0, &config).expect("sell");
        assert_eq!(sale.stk_tx.tx_type, StkTxType::Sell);
        assert_eq!(sale.wallet_tx.tx_type, WalletTxType::StkSale);
        // Rs 10 per STK
        assert_eq!(sale.wallet_tx.amount, 15_000);
        assert_eq!(sale.stk_tx.description, "Sold 15 STK");

        // locked STK does not count
        let err = sell_stk(&mut conn, &session, 10 * MICRO_STK_PER_STK, None, T0, &config).expect_err("short");
        assert!(matches!(
            err,
            EngineError::Stk(gbnet_stk::StkError::InsufficientAvailableBalance { .. })
        ));
        let balance = stk::balance(&conn, &a.user_code).expect("stk");
        assert_eq!(balance.available, 5 * MICRO_STK_PER_STK);
        assert_eq!(balance.locked, 50 * MICRO_STK_PER_STK);
        assert_eq!(wallet::balance(&conn, &a.user_code).expect("a").main_balance, 15_000);
    }

    #[test]
    fn test_sell_stk_retry_settles_once() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let config = EngineConfig::default();
        gbnet_stk::credit(&conn, &a.user_code, 20 * MICRO_STK_PER_STK, StkTxType::Buy, "buy", T0, &config.stk)
            .expect("buy");
        let session = Session::member(&a.user_code);
        let amount = 5 * MICRO_STK_PER_STK;

        let first = sell_stk(&mut conn, &session, amount, Some("sell-1"), T0, &config).expect("sell");
        assert!(!first.replayed);
        let again = sell_stk(&mut conn, &session, amount, Some("sell-1"), T0 + 60, &config)
            .expect("retry");
        assert!(again.replayed);
        assert_eq!(again.stk_tx.id, first.stk_tx.id);
        assert_eq!(again.wallet_tx.id, first.wallet_tx.id);

        assert_eq!(stk::balance(&conn, &a.user_code).expect("stk").available, 15 * MICRO_STK_PER_STK);
        assert_eq!(wallet::balance(&conn, &a.user_code).expect("a").main_balance, 5_000);

        // same key, different amount
        assert!(matches!(
            sell_stk(&mut conn, &session, 2 * amount, Some("sell-1"), T0, &config),
            Err(EngineError::Wallet(gbnet_wallet::WalletError::RequestKeyConflict(_)))
        ));
        assert_eq!(stk::balance(&conn, &a.user_code).expect("stk").available, 15 * MICRO_STK_PER_STK);
    }

    #[test]
    fn test_format_stk() {
        assert_eq!(format_stk(3 * MICRO_STK_PER_STK), "3 STK");
        assert_eq!(format_stk(1_500_000), "1.500000 STK");
    }
}
