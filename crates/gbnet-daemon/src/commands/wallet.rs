//! Wallet command handlers. Amounts are in paise.

use std::sync::Arc;

use gbnet_engine::{authorize_view, EngineError};
use gbnet_types::{time, Session};
use serde_json::{json, Value};

use super::{optional_str, required_str, required_u64, target_user, to_json, Result};
use crate::DaemonState;

const DEFAULT_HISTORY: u64 = 50;
const MAX_HISTORY: u64 = 500;

pub async fn get_wallet(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = target_user(session, params);
    authorize_view(session, user_code)?;
    let db = state.db.lock().await;
    to_json(&gbnet_wallet::balance(&db, user_code).map_err(EngineError::from)?)
}

/// Recent wallet transactions, newest first. Params: optional `limit`.
pub async fn get_transactions(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = target_user(session, params);
    authorize_view(session, user_code)?;
    let limit = match params.get("limit") {
        None => DEFAULT_HISTORY,
        Some(_) => required_u64(params, "limit")?.min(MAX_HISTORY),
    };
    let db = state.db.lock().await;
    let history = gbnet_wallet::history(&db, user_code, limit as u32).map_err(EngineError::from)?;
    to_json(&history)
}

/// Params: `amount`, `reference`, optional `request_key`.
pub async fn submit_deposit(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let amount = required_u64(params, "amount")?;
    let reference = required_str(params, "reference")?;
    let now = time::now();

    let mut db = state.db.lock().await;
    let tx = gbnet_engine::submit_deposit(
        &mut db,
        session,
        amount,
        reference,
        optional_str(params, "request_key"),
        now,
        &state.config.compensation,
    )?;
    drop(db);

    state.event_bus.emit(
        "DepositRequested",
        now,
        json!({ "user_code": tx.user_code, "tx_id": tx.id, "amount": amount }),
    );
    to_json(&tx)
}

/// Params: `amount` (gross), optional `request_key`.
pub async fn submit_withdrawal(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let amount = required_u64(params, "amount")?;
    let now = time::now();

    let mut db = state.db.lock().await;
    let tx = gbnet_engine::submit_withdrawal(
        &mut db,
        session,
        amount,
        optional_str(params, "request_key"),
        now,
        &state.config.compensation,
    )?;
    drop(db);

    state.event_bus.emit(
        "WithdrawalRequested",
        now,
        json!({ "user_code": tx.user_code, "tx_id": tx.id, "gross": amount }),
    );
    to_json(&tx)
}

/// Params: `amount`, optional `request_key`.
pub async fn submit_topup(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let amount = required_u64(params, "amount")?;
    let now = time::now();

    let mut db = state.db.lock().await;
    let (debit, credit) = gbnet_engine::submit_topup(
        &mut db,
        session,
        amount,
        optional_str(params, "request_key"),
        now,
        &state.config.compensation,
    )?;
    drop(db);

    state.event_bus.emit(
        "TopupCompleted",
        now,
        json!({ "user_code": session.user_code, "amount": amount }),
    );
    Ok(json!({ "debit": to_json(&debit)?, "credit": to_json(&credit)? }))
}

/// Params: `recipient_code`, `amount`, optional `request_key`.
pub async fn submit_transfer(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let recipient = required_str(params, "recipient_code")?;
    let amount = required_u64(params, "amount")?;
    let now = time::now();

    let mut db = state.db.lock().await;
    let receipt = gbnet_engine::submit_transfer(
        &mut db,
        session,
        recipient,
        amount,
        optional_str(params, "request_key"),
        now,
        &state.config.compensation,
    )?;
    drop(db);

    state.event_bus.emit(
        "TransferCompleted",
        now,
        json!({
            "user_code": session.user_code,
            "counterparty_code": recipient,
            "amount": amount,
            "tax": receipt.tax,
        }),
    );
    to_json(&receipt)
}
