//! Leg head-counts, direct referrals and leg BV.

use gbnet_db::queries::{bv, users};
use gbnet_types::dashboard::TeamCounts;
use gbnet_types::{CentiBv, Side};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{require_user, Result};

/// Most directs anyone can have: one child per side of the binary tree.
/// Both policies count placement children, so neither can exceed it.
pub const MAX_DIRECTS: u32 = 2;

/// Which direct referrals count toward commission unlocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectPolicy {
    /// Active directs with at least one completed order.
    #[default]
    Purchased,
    /// Every active direct.
    Active,
}

impl DirectPolicy {
    fn requires_purchase(self) -> bool {
        matches!(self, DirectPolicy::Purchased)
    }
}

/// Number of qualifying direct referrals of `user_code`.
pub fn direct_referral_count(
    conn: &Connection,
    user_code: &str,
    policy: DirectPolicy,
) -> Result<u32> {
    Ok(users::count_directs(
        conn,
        user_code,
        policy.requires_purchase(),
    )?)
}

/// Head-counts of both legs plus qualifying directs.
pub fn team_counts(conn: &Connection, user_code: &str, policy: DirectPolicy) -> Result<TeamCounts> {
    require_user(conn, user_code)?;
    let left = users::leg_size(conn, user_code, Side::Left)?;
    let right = users::leg_size(conn, user_code, Side::Right)?;
    Ok(TeamCounts {
        left,
        right,
        total: left + right,
        qualified_directs: direct_referral_count(conn, user_code, policy)?,
    })
}

/// Active BV credited to `user_code` that originated in its `side` leg.
///
/// Only the user's own entries count: a downline purchase reaches this sum
/// through the decayed entry it created for `user_code`, not through the
/// entries it created for members inside the leg.
pub fn subtree_bv(conn: &Connection, user_code: &str, side: Side) -> Result<CentiBv> {
    require_user(conn, user_code)?;
    Ok(bv::leg_active_total(conn, user_code, side)?)
}
