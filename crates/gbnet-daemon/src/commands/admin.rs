//! Admin command handlers. The engine rejects non-admin sessions.

use std::sync::Arc;

use gbnet_engine::admin::{self, NewProduct};
use gbnet_types::ledger::WalletTxType;
use gbnet_types::{time, KycStatus, Session};
use serde_json::{json, Value};

use super::{field, optional_str, required_str, required_u64, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

fn tx_id(params: &Value) -> std::result::Result<i64, RpcError> {
    i64::try_from(required_u64(params, "tx_id")?)
        .map_err(|_| RpcError::invalid_params("tx_id out of range"))
}

/// Params: `name`, `price`, `bv_credits`, optional `gst_bps`, `stk_credits`.
pub async fn add_product(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let product: NewProduct = serde_json::from_value(params.clone())
        .map_err(|e| RpcError::invalid_params(&e.to_string()))?;
    let now = time::now();
    let mut db = state.db.lock().await;
    let row = admin::add_product(&mut db, session, &product, now)?;
    drop(db);
    state
        .event_bus
        .emit("ProductAdded", now, json!({ "product_id": row.id, "name": row.name }));
    to_json(&row)
}

/// Params: `tx_type` ("deposit" or "withdrawal").
pub async fn get_pending_requests(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let tx_type: WalletTxType = field(params, "tx_type")?;
    let db = state.db.lock().await;
    to_json(&admin::pending_requests(&db, session, tx_type)?)
}

pub async fn approve_deposit(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let id = tx_id(params)?;
    let now = time::now();
    let mut db = state.db.lock().await;
    let tx = admin::approve_deposit(&mut db, session, id, now)?;
    drop(db);
    state.event_bus.emit(
        "DepositApproved",
        now,
        json!({ "user_code": tx.user_code, "tx_id": tx.id, "amount": tx.amount }),
    );
    to_json(&tx)
}

pub async fn reject_deposit(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let id = tx_id(params)?;
    let now = time::now();
    let mut db = state.db.lock().await;
    let tx = admin::reject_deposit(&mut db, session, id, now)?;
    drop(db);
    state
        .event_bus
        .emit("DepositRejected", now, json!({ "user_code": tx.user_code, "tx_id": tx.id }));
    to_json(&tx)
}

pub async fn complete_withdrawal(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let id = tx_id(params)?;
    let now = time::now();
    let mut db = state.db.lock().await;
    let tx = admin::complete_withdrawal(&mut db, session, id, now)?;
    drop(db);
    state
        .event_bus
        .emit("WithdrawalCompleted", now, json!({ "user_code": tx.user_code, "tx_id": tx.id }));
    to_json(&tx)
}

/// Params: `tx_id`, optional `reason`.
pub async fn reject_withdrawal(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let id = tx_id(params)?;
    let reason = optional_str(params, "reason").unwrap_or("rejected by admin");
    let now = time::now();
    let mut db = state.db.lock().await;
    let refund = admin::reject_withdrawal(&mut db, session, id, reason, now)?;
    drop(db);
    state.event_bus.emit(
        "WithdrawalRejected",
        now,
        json!({ "user_code": refund.user_code, "tx_id": id, "refund": refund.amount }),
    );
    to_json(&refund)
}

/// Params: `user_code`, `status` ("not_submitted" | "pending" | "approved" | "rejected").
pub async fn set_kyc_status(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = required_str(params, "user_code")?;
    let status: KycStatus = field(params, "status")?;
    let mut db = state.db.lock().await;
    to_json(&admin::set_kyc_status(&mut db, session, user_code, status)?)
}

/// Params: `user_code`, `active`.
pub async fn set_user_active(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = required_str(params, "user_code")?;
    let active: bool = field(params, "active")?;
    let mut db = state.db.lock().await;
    to_json(&admin::set_user_active(&mut db, session, user_code, active)?)
}

/// Params: `user_code`, `amount` in micro-STK, optional `description`.
pub async fn credit_stk_reward(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = required_str(params, "user_code")?;
    let amount = required_u64(params, "amount")?;
    let description = optional_str(params, "description").unwrap_or_default();
    let now = time::now();
    let mut db = state.db.lock().await;
    let lot = admin::credit_stk_reward(
        &mut db,
        session,
        user_code,
        amount,
        description,
        now,
        &state.config.compensation,
    )?;
    drop(db);
    state.event_bus.emit(
        "StkRewardCredited",
        now,
        json!({ "user_code": user_code, "amount": amount, "unlock_at": lot.unlock_at }),
    );
    to_json(&lot)
}

/// Pay last month's salaries now.
pub async fn pay_salaries(state: &Arc<DaemonState>, session: &Session) -> Result {
    let now = time::now();
    let mut db = state.db.lock().await;
    let report = admin::pay_salaries(&mut db, session, now, &state.config.compensation)?;
    drop(db);
    state.event_bus.emit("SalaryRunCompleted", now, to_json(&report)?);
    to_json(&report)
}

/// Run the daily sweep now.
pub async fn run_maintenance(state: &Arc<DaemonState>, session: &Session) -> Result {
    let now = time::now();
    let db = state.db.lock().await;
    let report = admin::run_maintenance(&db, session, now)?;
    drop(db);
    state.event_bus.emit("MaintenanceCompleted", now, to_json(&report)?);
    to_json(&report)
}
