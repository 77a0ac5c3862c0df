//! Member and placement structures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ParseEnumError, Timestamp};

/// Slot under a sponsor in the binary tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// The other leg.
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(ParseEnumError::new("side", other)),
        }
    }
}

/// KYC review state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    #[default]
    NotSubmitted,
    Pending,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KycStatus::NotSubmitted => "not_submitted",
            KycStatus::Pending => "pending",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for KycStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_submitted" => Ok(KycStatus::NotSubmitted),
            "pending" => Ok(KycStatus::Pending),
            "approved" => Ok(KycStatus::Approved),
            "rejected" => Ok(KycStatus::Rejected),
            other => Err(ParseEnumError::new("kyc status", other)),
        }
    }
}

/// A registered member.
///
/// `sponsor_code` is a weak back-reference to another user's code; the tree
/// is stored flat and traversed by query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct User {
    pub user_code: String,
    pub name: String,
    pub email: String,
    pub sponsor_code: Option<String>,
    pub side: Option<Side>,
    pub referral_code: String,
    pub kyc_status: KycStatus,
    pub is_active: bool,
    pub created_at: Timestamp,
    /// When the tree position was fixed. `None` only inside the
    /// registration transaction, before placement.
    pub placed_at: Option<Timestamp>,
}

impl User {
    /// True if the user has no sponsor (a root of the forest).
    pub fn is_root(&self) -> bool {
        self.sponsor_code.is_none()
    }
}

/// Profile fields supplied at registration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewUserProfile {
    pub name: String,
    pub email: String,
}
