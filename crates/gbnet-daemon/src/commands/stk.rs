//! STK command handlers.

use std::sync::Arc;

use gbnet_engine::{authorize_view, EngineError};
use gbnet_types::{time, Session};
use serde_json::{json, Value};

use super::{optional_str, required_u64, target_user, to_json, Result};
use crate::DaemonState;

/// Balances, pending lots and recent history.
pub async fn get_stk_balance(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = target_user(session, params);
    authorize_view(session, user_code)?;
    let db = state.db.lock().await;
    let balance = gbnet_stk::balance(&db, user_code).map_err(EngineError::from)?;
    let lots = gbnet_stk::lots(&db, user_code).map_err(EngineError::from)?;
    let history = gbnet_stk::history(&db, user_code, 50).map_err(EngineError::from)?;
    Ok(json!({
        "available": balance.available,
        "locked": balance.locked,
        "total": balance.total(),
        "lots": to_json(&lots)?,
        "history": to_json(&history)?,
    }))
}

/// Sell available STK. Params: `amount` in micro-STK, optional `request_key`.
pub async fn sell_stk(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let amount = required_u64(params, "amount")?;
    let request_key = optional_str(params, "request_key");
    let now = time::now();

    let mut db = state.db.lock().await;
    let sale = gbnet_engine::sell_stk(
        &mut db,
        session,
        amount,
        request_key,
        now,
        &state.config.compensation,
    )?;
    drop(db);

    if !sale.replayed {
        state.event_bus.emit(
            "StkSold",
            now,
            json!({ "user_code": session.user_code, "amount": amount, "value": sale.wallet_tx.amount }),
        );
    }
    to_json(&sale)
}
