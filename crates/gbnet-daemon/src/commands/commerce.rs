//! Catalogue and purchase command handlers.

use std::sync::Arc;

use gbnet_types::{time, Session};
use serde_json::{json, Value};

use super::{optional_str, required_u64, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

pub async fn list_products(state: &Arc<DaemonState>) -> Result {
    let db = state.db.lock().await;
    to_json(&gbnet_engine::list_products(&db)?)
}

/// Buy a product. Params: `product_id`, `quantity` (default 1), optional
/// `request_key` for safe retries.
pub async fn submit_purchase(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let product_id = i64::try_from(required_u64(params, "product_id")?)
        .map_err(|_| RpcError::invalid_params("product_id out of range"))?;
    let quantity = match params.get("quantity") {
        None => 1,
        Some(_) => u32::try_from(required_u64(params, "quantity")?)
            .map_err(|_| RpcError::invalid_params("quantity out of range"))?,
    };
    let request_key = optional_str(params, "request_key");
    let now = time::now();

    let mut db = state.db.lock().await;
    let receipt = gbnet_engine::submit_purchase(
        &mut db,
        session,
        product_id,
        quantity,
        request_key,
        now,
        &state.config.compensation,
    )?;
    drop(db);

    if !receipt.replayed {
        state.event_bus.emit(
            "PurchaseCompleted",
            now,
            json!({
                "user_code": receipt.order.user_code,
                "order_id": receipt.order.id,
                "amount": receipt.order.amount,
                "bv": receipt.order.bv_credited,
                "commissions": receipt.commissions.len(),
            }),
        );
    }
    to_json(&receipt)
}
