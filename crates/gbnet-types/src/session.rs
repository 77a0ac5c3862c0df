//! Explicit identity context passed into every engine operation.

use serde::{Deserialize, Serialize};

/// Caller role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

/// Identity of the caller, established upstream of the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_code: String,
    #[serde(default)]
    pub role: Role,
}

impl Session {
    pub fn member(user_code: impl Into<String>) -> Self {
        Self {
            user_code: user_code.into(),
            role: Role::Member,
        }
    }

    pub fn admin(user_code: impl Into<String>) -> Self {
        Self {
            user_code: user_code.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_role_defaults_to_member() {
        let session: Session =
            serde_json::from_str(r#"{"user_code":"GB00001"}"#).expect("parse");
        assert_eq!(session.role, Role::Member);
        assert!(!session.is_admin());
    }

    #[test]
    fn test_admin_session() {
        assert!(Session::admin("GB00001").is_admin());
    }
}
