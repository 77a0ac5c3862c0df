//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Handlers
//! take the database lock for the whole call, so requests are processed one
//! at a time.

pub mod admin;
pub mod commerce;
pub mod member;
pub mod stk;
pub mod wallet;

use gbnet_types::Session;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::rpc::RpcError;

pub type Result = std::result::Result<Value, RpcError>;

/// The caller identity every request carries in `params.session`.
pub fn session(params: &Value) -> std::result::Result<Session, RpcError> {
    field(params, "session")
}

/// Deserialize a required parameter.
pub fn field<T: DeserializeOwned>(params: &Value, key: &str) -> std::result::Result<T, RpcError> {
    let value = params
        .get(key)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
}

pub fn required_str<'a>(params: &'a Value, key: &str) -> std::result::Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

pub fn required_u64(params: &Value, key: &str) -> std::result::Result<u64, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be a non-negative integer")))
}

pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// The member a read targets: `params.user_code`, or the caller.
pub fn target_user<'a>(session: &'a Session, params: &'a Value) -> &'a str {
    optional_str(params, "user_code").unwrap_or(&session.user_code)
}

pub fn to_json<T: Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&format!("serialize: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_param() {
        let session = session(&json!({"session": {"user_code": "GB00001", "role": "admin"}}))
            .expect("session");
        assert!(session.is_admin());
        assert_eq!(
            super::session(&json!({})).map_err(|e| e.code),
            Err(-32602)
        );
    }

    #[test]
    fn test_param_helpers() {
        let params = json!({"amount": 500, "note": "x", "negative": -1});
        assert_eq!(required_u64(&params, "amount"), Ok(500));
        assert!(required_u64(&params, "negative").is_err());
        assert_eq!(required_str(&params, "note"), Ok("x"));
        assert!(required_str(&params, "missing").is_err());
        assert_eq!(optional_str(&params, "missing"), None);
    }

    #[test]
    fn test_target_user_defaults_to_caller() {
        let caller = Session::member("GB00004");
        assert_eq!(target_user(&caller, &json!({})), "GB00004");
        assert_eq!(target_user(&caller, &json!({"user_code": "GB00001"})), "GB00001");
    }
}
