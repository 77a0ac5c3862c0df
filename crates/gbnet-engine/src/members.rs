//! Registration and member read models.

use gbnet_db::queries::users::{self, LegMemberRow};
use gbnet_salary::{Eligibility, Rank, SlabPay};
use gbnet_tree::Placement;
use gbnet_types::dashboard::{BvSummary, DashboardSummary, SalarySummary, TeamCounts};
use gbnet_types::user::NewUserProfile;
use gbnet_types::{CentiBv, Side, Timestamp, User};
use rusqlite::Connection;
use serde::Serialize;

use crate::{in_transaction, EngineConfig, EngineError, Result};

/// Register a new member and place them in the tree.
pub fn register_user(
    conn: &mut Connection,
    profile: &NewUserProfile,
    placement: &Placement,
    now: Timestamp,
) -> Result<User> {
    in_transaction(conn, |conn| {
        Ok(gbnet_tree::register_user(conn, profile, placement, now)?)
    })
}

fn require_user(conn: &Connection, user_code: &str) -> Result<User> {
    users::find(conn, user_code)?.ok_or_else(|| EngineError::UserNotFound(user_code.to_string()))
}

/// Everything the member dashboard shows.
///
/// Slab, rank and eligibility are derived from the live BV ledger on every
/// call; none of them is stored.
pub fn dashboard_summary(
    conn: &Connection,
    user_code: &str,
    config: &EngineConfig,
) -> Result<DashboardSummary> {
    require_user(conn, user_code)?;
    let team = gbnet_tree::team_counts(conn, user_code, config.direct_policy)?;
    let legs = gbnet_salary::leg_volumes(conn, user_code)?;
    let balanced = legs.balanced();

    let slab = gbnet_salary::resolve_slab(balanced, &config.slabs);
    let fixed_salary = slab.and_then(|s| match s.pay {
        SlabPay::Fixed { amount } => Some(amount),
        SlabPay::CtoShare { .. } => None,
    });

    Ok(DashboardSummary {
        user_code: user_code.to_string(),
        team,
        bv: BvSummary {
            left: legs.left,
            right: legs.right,
            balanced,
            total_active: gbnet_bv::active_bv_for(conn, user_code)?,
        },
        salary: SalarySummary {
            slab_level: slab.map(|s| s.level),
            fixed_salary,
            rank: gbnet_salary::resolve_rank(balanced, &config.slabs).name,
            eligibility: gbnet_salary::eligibility_check(balanced, &config.slabs).message,
        },
        commissions: gbnet_commission::commission_totals(conn, user_code)?,
        wallet: gbnet_wallet::balance(conn, user_code)?,
        stk: gbnet_stk::balance(conn, user_code)?,
    })
}

/// Both legs of a member with head-counts.
#[derive(Clone, Debug, Serialize)]
pub struct TeamView {
    pub counts: TeamCounts,
    pub left: Vec<LegMemberRow>,
    pub right: Vec<LegMemberRow>,
}

pub fn team(conn: &Connection, user_code: &str, config: &EngineConfig) -> Result<TeamView> {
    let counts = gbnet_tree::team_counts(conn, user_code, config.direct_policy)?;
    Ok(TeamView {
        counts,
        left: users::leg_members(conn, user_code, Side::Left)?,
        right: users::leg_members(conn, user_code, Side::Right)?,
    })
}

/// Rank with the balanced BV it was derived from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankView {
    pub balanced_bv: CentiBv,
    pub rank: Rank,
}

pub fn rank(conn: &Connection, user_code: &str, config: &EngineConfig) -> Result<RankView> {
    require_user(conn, user_code)?;
    let balanced_bv = gbnet_salary::compute_balanced_bv(conn, user_code)?;
    Ok(RankView {
        balanced_bv,
        rank: gbnet_salary::resolve_rank(balanced_bv, &config.slabs),
    })
}

pub fn eligibility(conn: &Connection, user_code: &str, config: &EngineConfig) -> Result<Eligibility> {
    require_user(conn, user_code)?;
    let balanced = gbnet_salary::compute_balanced_bv(conn, user_code)?;
    Ok(gbnet_salary::eligibility_check(balanced, &config.slabs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{db, root, under, T0};

    #[test]
    fn test_register_through_engine() {
        let mut conn = db();
        let first = register_user(
            &mut conn,
            &NewUserProfile {
                name: "Asha".into(),
                email: "Asha@Example.com".into(),
            },
            &Placement::Root,
            T0,
        )
        .expect("register");
        assert_eq!(first.user_code, "GB00001");
        assert_eq!(first.email, "asha@example.com");

        let taken = register_user(
            &mut conn,
            &NewUserProfile {
                name: "Other".into(),
                email: "asha@example.com".into(),
            },
            &Placement::Sponsored {
                referral_code: first.referral_code.clone(),
                side: Side::Left,
            },
            T0,
        );
        assert!(matches!(taken, Err(EngineError::Tree(gbnet_tree::TreeError::EmailTaken(_)))));
        // nothing half-written
        assert!(users::find(&conn, "GB00002").expect("find").is_none());
    }

    #[test]
    fn test_empty_dashboard() {
        let conn = db();
        let a = root(&conn, "Asha");
        let summary = dashboard_summary(&conn, &a.user_code, &EngineConfig::default())
            .expect("dashboard");
        assert_eq!(summary.team, TeamCounts::default());
        assert_eq!(summary.bv, BvSummary::default());
        assert_eq!(summary.salary.slab_level, None);
        assert_eq!(summary.salary.rank, "Associate");
        assert!(summary.salary.eligibility.starts_with("Salary locked"));
        assert_eq!(summary.commissions.total_paid, 0);
    }

    #[test]
    fn test_team_view() {
        let conn = db();
        let a = root(&conn, "Asha");
        let b = under(&conn, "Bala", &a, Side::Left);
        under(&conn, "Chitra", &b, Side::Right);
        under(&conn, "Dev", &a, Side::Right);

        let view = team(&conn, &a.user_code, &EngineConfig::default()).expect("team");
        assert_eq!(view.counts.left, 2);
        assert_eq!(view.counts.right, 1);
        assert_eq!(view.left.len(), 2);
        assert_eq!(view.left[0].user_code, b.user_code);
        assert_eq!(view.left[1].depth, 2);
    }

    #[test]
    fn test_unknown_user() {
        let conn = db();
        assert!(matches!(
            rank(&conn, "GB09999", &EngineConfig::default()),
            Err(EngineError::UserNotFound(_))
        ));
    }
}
