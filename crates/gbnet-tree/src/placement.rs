//! Placing users into the binary tree.

use gbnet_db::queries::users;
use gbnet_db::DbError;
use gbnet_types::{Side, Timestamp};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{require_user, Result, TreeError};

/// Where a user ended up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePosition {
    pub user_code: String,
    pub sponsor_code: String,
    pub side: Side,
    /// Number of sponsors above the user.
    pub depth: u32,
}

/// Place `user_code` in the `side` slot of the referral code's owner.
///
/// The slot must be free: this never spills over into a deeper slot (see
/// [`find_extreme_slot`] for callers that want that).
///
/// # Errors
///
/// - [`TreeError::UserNotFound`] if the user does not exist
/// - [`TreeError::AlreadyPlaced`] if the user already has a position
/// - [`TreeError::SponsorNotFound`] if the referral code is unknown or its owner is unplaced
/// - [`TreeError::SponsorInactive`] if the sponsor is blocked
/// - [`TreeError::CycleDetected`] if the sponsor is the user or below the user
/// - [`TreeError::SlotOccupied`] if the slot is taken
pub fn place_user(
    conn: &Connection,
    user_code: &str,
    sponsor_referral_code: &str,
    side: Side,
    now: Timestamp,
) -> Result<TreePosition> {
    let user = require_user(conn, user_code)?;
    if user.placed_at.is_some() {
        return Err(TreeError::AlreadyPlaced(user.user_code));
    }

    let sponsor = users::find_by_referral_code(conn, sponsor_referral_code)?
        .filter(|s| s.placed_at.is_some() || s.user_code == user.user_code)
        .ok_or_else(|| TreeError::SponsorNotFound(sponsor_referral_code.to_string()))?;

    if sponsor.user_code == user.user_code
        || users::is_ancestor(conn, &user.user_code, &sponsor.user_code)?
    {
        return Err(TreeError::CycleDetected {
            user_code: user.user_code,
            sponsor_code: sponsor.user_code,
        });
    }
    if !sponsor.is_active {
        return Err(TreeError::SponsorInactive(sponsor.user_code));
    }
    if users::child_at(conn, &sponsor.user_code, side)?.is_some() {
        return Err(TreeError::SlotOccupied {
            sponsor_code: sponsor.user_code,
            side,
        });
    }

    let placed = match users::set_placement(conn, user_code, Some((&sponsor.user_code, side)), now)
    {
        Ok(placed) => placed,
        // the unique slot index caught a concurrent placement
        Err(DbError::Constraint(_)) => {
            return Err(TreeError::SlotOccupied {
                sponsor_code: sponsor.user_code,
                side,
            })
        }
        Err(e) => return Err(e.into()),
    };
    if !placed {
        return Err(TreeError::AlreadyPlaced(user.user_code));
    }

    let depth = users::depth(conn, user_code)?;
    tracing::info!(
        user = %user_code,
        sponsor = %sponsor.user_code,
        side = %side,
        depth,
        "user placed"
    );

    Ok(TreePosition {
        user_code: user_code.to_string(),
        sponsor_code: sponsor.user_code,
        side,
        depth,
    })
}

/// Mark a user as a tree root (no sponsor).
pub(crate) fn place_root(conn: &Connection, user_code: &str, now: Timestamp) -> Result<()> {
    if !users::set_placement(conn, user_code, None, now)? {
        return Err(TreeError::AlreadyPlaced(user_code.to_string()));
    }
    tracing::info!(user = %user_code, "root user created");
    Ok(())
}

/// Walk down the outer `side` edge from `sponsor_code` to the first user
/// whose `side` slot is free, and return that user's code.
pub fn find_extreme_slot(conn: &Connection, sponsor_code: &str, side: Side) -> Result<String> {
    require_user(conn, sponsor_code)?;
    let mut current = sponsor_code.to_string();
    while let Some(child) = users::child_at(conn, &current, side)? {
        current = child;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{add, add_unplaced};

    fn test_db() -> Connection {
        let conn = gbnet_db::open_memory().expect("open test db");
        add(&conn, "GB00001", None);
        conn
    }

    #[test]
    fn test_place_into_free_slot() {
        let conn = test_db();
        add_unplaced(&conn, "GB00002");
        let pos = place_user(&conn, "GB00002", "RGB00001", Side::Left, 200).expect("place");
        assert_eq!(pos.sponsor_code, "GB00001");
        assert_eq!(pos.side, Side::Left);
        assert_eq!(pos.depth, 1);

        let user = users::get(&conn, "GB00002").expect("get");
        assert_eq!(user.placed_at, Some(200));
    }

    #[test]
    fn test_slot_occupied() {
        let conn = test_db();
        add(&conn, "GB00002", Some(("GB00001", Side::Left)));
        add_unplaced(&conn, "GB00003");
        let err = place_user(&conn, "GB00003", "RGB00001", Side::Left, 200).expect_err("taken");
        assert!(matches!(err, TreeError::SlotOccupied { side: Side::Left, .. }));
        // state unchanged
        assert_eq!(users::get(&conn, "GB00003").expect("get").placed_at, None);
    }

    #[test]
    fn test_unknown_referral_code() {
        let conn = test_db();
        add_unplaced(&conn, "GB00002");
        assert!(matches!(
            place_user(&conn, "GB00002", "NOPE1234", Side::Left, 200),
            Err(TreeError::SponsorNotFound(_))
        ));
    }

    #[test]
    fn test_blocked_sponsor() {
        let conn = test_db();
        users::set_active(&conn, "GB00001", false).expect("block");
        add_unplaced(&conn, "GB00002");
        assert!(matches!(
            place_user(&conn, "GB00002", "RGB00001", Side::Right, 200),
            Err(TreeError::SponsorInactive(_))
        ));
    }

    #[test]
    fn test_already_placed() {
        let conn = test_db();
        add(&conn, "GB00002", Some(("GB00001", Side::Left)));
        assert!(matches!(
            place_user(&conn, "GB00002", "RGB00001", Side::Right, 200),
            Err(TreeError::AlreadyPlaced(_))
        ));
    }

    #[test]
    fn test_self_sponsor_is_cycle() {
        let conn = test_db();
        add_unplaced(&conn, "GB00002");
        assert!(matches!(
            place_user(&conn, "GB00002", "RGB00002", Side::Left, 200),
            Err(TreeError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_find_extreme_slot() {
        let conn = test_db();
        add(&conn, "GB00002", Some(("GB00001", Side::Left)));
        add(&conn, "GB00003", Some(("GB00002", Side::Left)));
        add(&conn, "GB00004", Some(("GB00002", Side::Right)));

        assert_eq!(find_extreme_slot(&conn, "GB00001", Side::Left).expect("left"), "GB00003");
        assert_eq!(find_extreme_slot(&conn, "GB00001", Side::Right).expect("right"), "GB00001");
    }
}
