//! JSON-RPC server over a Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC 2.0 calls to the command handlers. A
//! connection that calls `subscribe_events` also receives matching events as
//! `event` notifications until it unsubscribes or disconnects.

use std::path::PathBuf;
use std::sync::Arc;

use gbnet_engine::{EngineError, ErrorKind};
use gbnet_stk::StkError;
use gbnet_tree::TreeError;
use gbnet_wallet::WalletError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::events::{Event, EventFilter};
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    fn detail(code: i32, message: &str, detail: &str) -> Self {
        Self::new(code, message, Some(json!({ "detail": detail })))
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, "METHOD_NOT_FOUND", Some(json!({ "method": method })))
    }

    /// Invalid params (-32602). Also used for every validation failure.
    pub fn invalid_params(detail: &str) -> Self {
        Self::detail(-32602, "INVALID_PARAMS", detail)
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::detail(-32603, "INTERNAL_ERROR", detail)
    }

    /// Forbidden (-32003).
    pub fn forbidden(detail: &str) -> Self {
        Self::detail(-32003, "FORBIDDEN", detail)
    }

    /// Insufficient balance (-32040).
    pub fn insufficient_balance(required: u64, available: u64) -> Self {
        Self::new(
            -32040,
            "INSUFFICIENT_BALANCE",
            Some(json!({ "required": required, "available": available })),
        )
    }

    /// Database busy (-32050). The whole request may be retried.
    pub fn busy(detail: &str) -> Self {
        Self::new(
            -32050,
            "DATABASE_BUSY",
            Some(json!({ "detail": detail, "retryable": true })),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.code == -32050
    }
}

fn wallet_conflict(err: &WalletError) -> Option<RpcError> {
    let detail = err.to_string();
    Some(match err {
        WalletError::InsufficientBalance {
            available,
            required,
        } => RpcError::insufficient_balance(*required, *available),
        WalletError::KycNotApproved(_) => RpcError::detail(-32041, "KYC_NOT_APPROVED", &detail),
        WalletError::AccountBlocked(_) => RpcError::detail(-32042, "ACCOUNT_BLOCKED", &detail),
        WalletError::RequestKeyConflict(_) => {
            RpcError::detail(-32044, "REQUEST_KEY_CONFLICT", &detail)
        }
        WalletError::NotPending { .. } => RpcError::detail(-32045, "NOT_PENDING", &detail),
        _ => return None,
    })
}

/// Specific code for a state conflict, -32040 to -32049.
fn state_conflict(err: &EngineError) -> RpcError {
    let detail = err.to_string();
    let specific = match err {
        EngineError::Wallet(e) => wallet_conflict(e),
        EngineError::Stk(StkError::InsufficientAvailableBalance {
            available,
            requested,
        }) => Some(RpcError::insufficient_balance(*requested, *available)),
        EngineError::AccountBlocked(_) | EngineError::Tree(TreeError::SponsorInactive(_)) => {
            Some(RpcError::detail(-32042, "ACCOUNT_BLOCKED", &detail))
        }
        EngineError::Tree(_) => Some(RpcError::detail(-32043, "PLACEMENT_CONFLICT", &detail)),
        EngineError::RequestKeyConflict(_) => {
            Some(RpcError::detail(-32044, "REQUEST_KEY_CONFLICT", &detail))
        }
        EngineError::ProductInactive(_) => {
            Some(RpcError::detail(-32046, "PRODUCT_INACTIVE", &detail))
        }
        _ => None,
    };
    specific.unwrap_or_else(|| RpcError::detail(-32049, "STATE_CONFLICT", &detail))
}

impl From<EngineError> for RpcError {
    fn from(err: EngineError) -> Self {
        match err.kind() {
            ErrorKind::Validation => RpcError::invalid_params(&err.to_string()),
            ErrorKind::StateConflict => state_conflict(&err),
            ErrorKind::Transient => RpcError::busy(&err.to_string()),
            ErrorKind::Forbidden => RpcError::forbidden(&err.to_string()),
            ErrorKind::Internal => {
                error!(error = %err, "internal error");
                RpcError::internal_error(&err.to_string())
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // stale socket from an unclean exit
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(socket = ?self.socket_path, "IPC server listening");

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

type Subscription = (broadcast::Receiver<Event>, EventFilter);

enum Incoming {
    Line(Option<String>),
    Event(Event),
}

/// Next event passing the filter. Never resolves without a subscription.
async fn next_event(subscription: &mut Option<Subscription>) -> Event {
    let Some((rx, filter)) = subscription.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) if filter.matches(&event) => return event,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagging");
            }
            Err(broadcast::error::RecvError::Closed) => return std::future::pending().await,
        }
    }
}

async fn write_line<T: Serialize>(writer: &mut OwnedWriteHalf, value: &T) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Start an event subscription. Members only see events naming them.
fn subscribe(state: &DaemonState, request: RpcRequest) -> (RpcResponse, Option<Subscription>) {
    let session = match commands::session(&request.params) {
        Ok(session) => session,
        Err(err) => return (RpcResponse::error(request.id, err), None),
    };
    let mut filter = match serde_json::from_value::<EventFilter>(request.params) {
        Ok(filter) => filter,
        Err(e) => return (RpcResponse::error(request.id, RpcError::invalid_params(&e.to_string())), None),
    };
    if !session.is_admin() {
        filter.user_code = Some(session.user_code.clone());
    }
    debug!(user = %session.user_code, ?filter, "event subscription started");
    let response = RpcResponse::success(
        request.id,
        json!({ "subscribed": true, "sequence": state.event_bus.sequence() }),
    );
    (response, Some((state.event_bus.subscribe(), filter)))
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut subscription: Option<Subscription> = None;

    loop {
        let incoming = tokio::select! {
            line = lines.next_line() => Incoming::Line(line?),
            event = next_event(&mut subscription) => Incoming::Event(event),
        };

        let line = match incoming {
            Incoming::Line(Some(line)) => line,
            Incoming::Line(None) => break,
            Incoming::Event(event) => {
                let notification = json!({
                    "jsonrpc": "2.0",
                    "method": "event",
                    "params": event,
                });
                write_line(&mut writer, &notification).await?;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) if request.method == "subscribe_events" => {
                let (response, new) = subscribe(&state, request);
                if new.is_some() {
                    subscription = new;
                }
                response
            }
            Ok(request) if request.method == "unsubscribe_events" => {
                subscription = None;
                RpcResponse::success(request.id, json!({ "subscribed": false }))
            }
            Ok(request) => dispatch_request(state.clone(), request).await,
            Err(_) => RpcResponse::error(Value::Null, RpcError::parse_error()),
        };
        write_line(&mut writer, &response).await?;
    }

    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }
    let method = request.method.as_str();
    let params = &request.params;
    debug!(method, "dispatching RPC method");

    // Registration is the only call made before the caller has an account.
    if method == "register_user" {
        return respond(id, commands::member::register_user(&state, params).await);
    }
    let session = match commands::session(params) {
        Ok(session) => session,
        Err(err) => return RpcResponse::error(id, err),
    };
    let session = &session;

    let result = match method {
        // Member
        "get_dashboard_summary" => commands::member::get_dashboard_summary(&state, session, params).await,
        "get_team" => commands::member::get_team(&state, session, params).await,
        "get_rank" => commands::member::get_rank(&state, session, params).await,
        "get_eligibility" => commands::member::get_eligibility(&state, session, params).await,

        // Commerce
        "list_products" => commands::commerce::list_products(&state).await,
        "submit_purchase" => commands::commerce::submit_purchase(&state, session, params).await,

        // Wallet
        "get_wallet" => commands::wallet::get_wallet(&state, session, params).await,
        "get_transactions" => commands::wallet::get_transactions(&state, session, params).await,
        "submit_deposit" => commands::wallet::submit_deposit(&state, session, params).await,
        "submit_withdrawal" => commands::wallet::submit_withdrawal(&state, session, params).await,
        "submit_topup" => commands::wallet::submit_topup(&state, session, params).await,
        "submit_transfer" => commands::wallet::submit_transfer(&state, session, params).await,

        // STK
        "get_stk_balance" => commands::stk::get_stk_balance(&state, session, params).await,
        "sell_stk" => commands::stk::sell_stk(&state, session, params).await,

        // Admin
        "add_product" => commands::admin::add_product(&state, session, params).await,
        "get_pending_requests" => commands::admin::get_pending_requests(&state, session, params).await,
        "approve_deposit" => commands::admin::approve_deposit(&state, session, params).await,
        "reject_deposit" => commands::admin::reject_deposit(&state, session, params).await,
        "complete_withdrawal" => commands::admin::complete_withdrawal(&state, session, params).await,
        "reject_withdrawal" => commands::admin::reject_withdrawal(&state, session, params).await,
        "set_kyc_status" => commands::admin::set_kyc_status(&state, session, params).await,
        "set_user_active" => commands::admin::set_user_active(&state, session, params).await,
        "credit_stk_reward" => commands::admin::credit_stk_reward(&state, session, params).await,
        "pay_salaries" => commands::admin::pay_salaries(&state, session).await,
        "run_maintenance" => commands::admin::run_maintenance(&state, session).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    respond(id, result)
}

fn respond(id: Value, result: commands::Result) -> RpcResponse {
    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::state;

    async fn call(state: &Arc<DaemonState>, method: &str, params: Value) -> RpcResponse {
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params,
        };
        dispatch_request(state.clone(), request).await
    }

    fn error_code(response: &RpcResponse) -> i32 {
        response.error.as_ref().map(|e| e.code).unwrap_or_default()
    }

    #[test]
    fn test_rpc_error_codes() {
        let err = RpcError::insufficient_balance(100, 50);
        assert_eq!(err.code, -32040);
        assert_eq!(err.data, Some(json!({"required": 100, "available": 50})));

        let err = RpcError::method_not_found("unknown");
        assert_eq!(err.code, -32601);

        assert!(RpcError::busy("locked").is_retryable());
        assert!(!RpcError::internal_error("x").is_retryable());
    }

    #[test]
    fn test_engine_error_mapping() {
        let insufficient: RpcError = EngineError::Wallet(WalletError::InsufficientBalance {
            available: 1_000,
            required: 1_080,
        })
        .into();
        assert_eq!(insufficient.code, -32040);

        let stk: RpcError = EngineError::Stk(StkError::InsufficientAvailableBalance {
            available: 5,
            requested: 10,
        })
        .into();
        assert_eq!(stk.code, -32040);

        let kyc: RpcError = EngineError::Wallet(WalletError::KycNotApproved("GB00001".into())).into();
        assert_eq!(kyc.code, -32041);

        let forbidden: RpcError = EngineError::Forbidden("no".into()).into();
        assert_eq!(forbidden.code, -32003);

        let busy: RpcError =
            EngineError::Db(gbnet_db::DbError::Busy("database is locked".into())).into();
        assert_eq!(busy.code, -32050);

        let invalid: RpcError = EngineError::InvalidRequest("quantity".into()).into();
        assert_eq!(invalid.code, -32602);

        let conflict: RpcError = EngineError::RequestKeyConflict("k".into()).into();
        assert_eq!(conflict.code, -32044);
    }

    #[test]
    fn test_rpc_response_shapes() {
        let ok = RpcResponse::success(json!(1), json!({"balance": 1000}));
        assert!(ok.result.is_some());
        assert!(ok.error.is_none());

        let err = RpcResponse::error(json!(1), RpcError::internal_error("test"));
        assert!(err.result.is_none());
        assert_eq!(err.error.map(|e| e.code), Some(-32603));
    }

    #[test]
    fn test_member_subscription_scoped() {
        let state = state();
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: "subscribe_events".to_string(),
            params: json!({
                "session": {"user_code": "GB00002"},
                "categories": ["wallet"],
                "user_code": "GB00001",
            }),
        };
        let (response, subscription) = subscribe(&state, request);
        assert!(response.error.is_none());
        let (_rx, filter) = subscription.expect("subscribed");
        assert_eq!(filter.user_code.as_deref(), Some("GB00002"));
        assert_eq!(filter.categories, Some(vec!["wallet".to_string()]));
    }

    #[tokio::test]
    async fn test_session_required() {
        let state = state();
        let response = call(&state, "get_wallet", json!({})).await;
        assert_eq!(error_code(&response), -32602);

        let response = call(&state, "no_such_method", json!({"session": {"user_code": "GB00001"}})).await;
        assert_eq!(error_code(&response), -32601);
    }

    #[tokio::test]
    async fn test_wrong_version_rejected() {
        let state = state();
        let request = RpcRequest {
            jsonrpc: "1.0".to_string(),
            id: json!(7),
            method: "list_products".to_string(),
            params: Value::Null,
        };
        let response = dispatch_request(state, request).await;
        assert_eq!(error_code(&response), -32600);
    }

    #[tokio::test]
    async fn test_register_and_dashboard() {
        let state = state();
        let response = call(
            &state,
            "register_user",
            json!({"name": "Asha", "email": "asha@example.com", "placement": {"kind": "root"}}),
        )
        .await;
        let user = response.result.expect("registered");
        assert_eq!(user["user_code"], "GB00001");

        let response = call(
            &state,
            "get_dashboard_summary",
            json!({"session": {"user_code": "GB00001"}}),
        )
        .await;
        let summary = response.result.expect("summary");
        assert_eq!(summary["salary"]["rank"], "Associate");

        // members cannot read each other
        let response = call(
            &state,
            "get_dashboard_summary",
            json!({"session": {"user_code": "GB00002"}, "user_code": "GB00001"}),
        )
        .await;
        assert_eq!(error_code(&response), -32003);
    }

    #[tokio::test]
    async fn test_admin_only_methods() {
        let state = state();
        let response = call(
            &state,
            "run_maintenance",
            json!({"session": {"user_code": "GB00001", "role": "member"}}),
        )
        .await;
        assert_eq!(error_code(&response), -32003);

        let response = call(
            &state,
            "run_maintenance",
            json!({"session": {"user_code": "GB00001", "role": "admin"}}),
        )
        .await;
        assert_eq!(response.result.expect("report")["bv_expired"], 0);
    }
}
