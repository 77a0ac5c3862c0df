//! Admin-only operations.
//!
//! Every function checks the session role before touching the database.

use gbnet_db::queries::{commerce, users, wallet};
use gbnet_types::ledger::{StkTransaction, StkTxType, WalletTransaction, WalletTxType};
use gbnet_types::{Bps, CentiBv, KycStatus, MicroStk, Paise, Session, Timestamp, User, BPS_DENOMINATOR};
use rusqlite::Connection;

use crate::maintenance::{self, MaintenanceReport, SalaryRunReport};
use crate::{in_transaction, require_admin, EngineConfig, EngineError, Result};

/// Fields of a new catalogue product.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Paise,
    #[serde(default)]
    pub gst_bps: Bps,
    pub bv_credits: CentiBv,
    #[serde(default)]
    pub stk_credits: MicroStk,
}

pub fn add_product(
    conn: &mut Connection,
    session: &Session,
    product: &NewProduct,
    now: Timestamp,
) -> Result<commerce::ProductRow> {
    require_admin(session)?;
    let name = product.name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidRequest("product name is required".to_string()));
    }
    if product.price == 0 {
        return Err(EngineError::InvalidRequest("product price must be positive".to_string()));
    }
    if u64::from(product.gst_bps) > BPS_DENOMINATOR {
        return Err(EngineError::InvalidRequest(format!(
            "gst of {} bps exceeds 100%",
            product.gst_bps
        )));
    }
    in_transaction(conn, |conn| {
        let id = commerce::insert_product(
            conn,
            name,
            product.price,
            product.gst_bps,
            product.bv_credits,
            product.stk_credits,
            now,
        )?;
        tracing::info!(product = id, product_name = name, price = product.price, bv = product.bv_credits, "product added");
        Ok(commerce::get_product(conn, id)?)
    })
}

/// Pending deposits or withdrawals, oldest first.
pub fn pending_requests(
    conn: &Connection,
    session: &Session,
    tx_type: WalletTxType,
) -> Result<Vec<WalletTransaction>> {
    require_admin(session)?;
    if !matches!(tx_type, WalletTxType::Deposit | WalletTxType::Withdrawal) {
        return Err(EngineError::InvalidRequest(format!("{tx_type} requests are never pending")));
    }
    Ok(wallet::pending_of_type(conn, tx_type)?)
}

pub fn approve_deposit(
    conn: &mut Connection,
    session: &Session,
    tx_id: i64,
    now: Timestamp,
) -> Result<WalletTransaction> {
    require_admin(session)?;
    in_transaction(conn, |conn| Ok(gbnet_wallet::approve_deposit(conn, tx_id, now)?))
}

pub fn reject_deposit(
    conn: &mut Connection,
    session: &Session,
    tx_id: i64,
    now: Timestamp,
) -> Result<WalletTransaction> {
    require_admin(session)?;
    in_transaction(conn, |conn| Ok(gbnet_wallet::reject_deposit(conn, tx_id, now)?))
}

pub fn complete_withdrawal(
    conn: &mut Connection,
    session: &Session,
    tx_id: i64,
    now: Timestamp,
) -> Result<WalletTransaction> {
    require_admin(session)?;
    in_transaction(conn, |conn| Ok(gbnet_wallet::complete_withdrawal(conn, tx_id, now)?))
}

/// Reject a pending withdrawal and refund the gross amount.
pub fn reject_withdrawal(
    conn: &mut Connection,
    session: &Session,
    tx_id: i64,
    reason: &str,
    now: Timestamp,
) -> Result<WalletTransaction> {
    require_admin(session)?;
    in_transaction(conn, |conn| {
        Ok(gbnet_wallet::reject_withdrawal(conn, tx_id, reason, now)?)
    })
}

fn existing_user(conn: &Connection, user_code: &str) -> Result<User> {
    users::find(conn, user_code)?.ok_or_else(|| EngineError::UserNotFound(user_code.to_string()))
}

pub fn set_kyc_status(
    conn: &mut Connection,
    session: &Session,
    user_code: &str,
    status: KycStatus,
) -> Result<User> {
    require_admin(session)?;
    in_transaction(conn, |conn| {
        existing_user(conn, user_code)?;
        users::set_kyc_status(conn, user_code, status)?;
        tracing::info!(user = %user_code, kyc = status.as_str(), by = %session.user_code, "kyc status set");
        existing_user(conn, user_code)
    })
}

/// Block or unblock a member. Blocked members keep their tree position and
/// receive no commissions, salary or referral bonus.
pub fn set_user_active(
    conn: &mut Connection,
    session: &Session,
    user_code: &str,
    active: bool,
) -> Result<User> {
    require_admin(session)?;
    in_transaction(conn, |conn| {
        existing_user(conn, user_code)?;
        users::set_active(conn, user_code, active)?;
        tracing::info!(user = %user_code, active, by = %session.user_code, "account status set");
        existing_user(conn, user_code)
    })
}

/// Grant a locked STK reward lot.
pub fn credit_stk_reward(
    conn: &mut Connection,
    session: &Session,
    user_code: &str,
    amount: MicroStk,
    description: &str,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<StkTransaction> {
    require_admin(session)?;
    in_transaction(conn, |conn| {
        existing_user(conn, user_code)?;
        let description = if description.trim().is_empty() {
            "STK reward"
        } else {
            description.trim()
        };
        Ok(gbnet_stk::credit(
            conn,
            user_code,
            amount,
            StkTxType::Reward,
            description,
            now,
            &config.stk,
        )?)
    })
}

pub fn run_maintenance(conn: &Connection, session: &Session, now: Timestamp) -> Result<MaintenanceReport> {
    require_admin(session)?;
    maintenance::run_daily_maintenance(conn, now)
}

pub fn pay_salaries(
    conn: &mut Connection,
    session: &Session,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<SalaryRunReport> {
    require_admin(session)?;
    maintenance::pay_salaries(conn, now, config)
}
