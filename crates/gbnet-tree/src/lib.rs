//! # gbnet-tree
//!
//! Binary sponsor tree: placement, ancestry and leg aggregation.
//!
//! Every user has at most one left and one right child. A user is placed
//! exactly once, under the owner of a referral code, and never moves.
//!
//! ## Modules
//!
//! - [`placement`] - `place_user` and the spill-over helper
//! - [`ancestry`] - Lazy, restartable ancestor walks
//! - [`registration`] - New member registration
//! - [`team`] - Leg head-counts, direct referrals and leg BV

pub mod ancestry;
pub mod placement;
pub mod registration;
pub mod team;

pub use ancestry::{ancestor_chain, Ancestor, AncestorChain};
pub use placement::{find_extreme_slot, place_user, TreePosition};
pub use registration::{register_user, Placement};
pub use team::{direct_referral_count, subtree_bv, team_counts, DirectPolicy, MAX_DIRECTS};

use gbnet_db::DbError;
use gbnet_types::Side;

/// Error types for sponsor tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The user code does not exist.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The referral code does not resolve to a placed user.
    #[error("no sponsor for referral code {0}")]
    SponsorNotFound(String),

    /// The sponsor exists but is blocked.
    #[error("sponsor {0} is blocked")]
    SponsorInactive(String),

    /// The requested slot already has a child.
    #[error("{side} slot under {sponsor_code} is occupied")]
    SlotOccupied { sponsor_code: String, side: Side },

    /// The user already has a position.
    #[error("user {0} is already placed")]
    AlreadyPlaced(String),

    /// The sponsor is the user or one of the user's descendants.
    #[error("placing {user_code} under {sponsor_code} would create a cycle")]
    CycleDetected {
        user_code: String,
        sponsor_code: String,
    },

    /// Registration input failed validation.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    /// The email is already registered.
    #[error("email already registered: {0}")]
    EmailTaken(String),

    /// Random referral codes kept colliding.
    #[error("could not allocate a unique referral code")]
    ReferralCodeExhausted,

    /// Database error.
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

/// Convenience result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Fetch a user or fail with [`TreeError::UserNotFound`].
pub(crate) fn require_user(
    conn: &rusqlite::Connection,
    user_code: &str,
) -> Result<gbnet_types::User> {
    gbnet_db::queries::users::find(conn, user_code)?
        .ok_or_else(|| TreeError::UserNotFound(user_code.to_string()))
}
