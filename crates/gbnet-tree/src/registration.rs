//! New member registration.

use gbnet_db::queries::{stk, users, wallet};
use gbnet_types::user::NewUserProfile;
use gbnet_types::{format_user_code, Side, Timestamp, User};
use rand::Rng;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{placement, Result, TreeError};

/// Length of generated referral codes.
pub const REFERRAL_CODE_LEN: usize = 8;

const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REFERRAL_ATTEMPTS: usize = 16;

/// Where a new member goes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    /// Start a new tree.
    Root,
    /// Take the `side` slot of the referral code's owner.
    Sponsored {
        referral_code: String,
        side: Side,
    },
}

/// Register a user: allocate the next user code and a referral code, create
/// both wallets and fix the tree position.
///
/// Runs inside a savepoint, so a failed placement leaves no partial user.
pub fn register_user(
    conn: &Connection,
    profile: &NewUserProfile,
    placement: &Placement,
    now: Timestamp,
) -> Result<User> {
    let name = profile.name.trim();
    let email = profile.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(TreeError::InvalidProfile("name is empty".to_string()));
    }
    if !is_plausible_email(&email) {
        return Err(TreeError::InvalidProfile(format!("bad email {email:?}")));
    }

    gbnet_db::with_savepoint(conn, "register_user", |conn| {
        if users::email_exists(conn, &email)? {
            return Err(TreeError::EmailTaken(email.clone()));
        }

        let user_code = format_user_code(users::next_user_seq(conn)?);
        let referral_code = allocate_referral_code(conn)?;

        users::insert(conn, &user_code, name, &email, &referral_code, now)?;
        wallet::create(conn, &user_code, now)?;
        stk::create(conn, &user_code, now)?;

        match placement {
            Placement::Root => placement::place_root(conn, &user_code, now)?,
            Placement::Sponsored {
                referral_code,
                side,
            } => {
                placement::place_user(conn, &user_code, referral_code, *side, now)?;
            }
        }

        tracing::info!(user = %user_code, "user registered");
        Ok(users::get(conn, &user_code)?)
    })
}

fn allocate_referral_code(conn: &Connection) -> Result<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..REFERRAL_ATTEMPTS {
        let code: String = (0..REFERRAL_CODE_LEN)
            .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
            .collect();
        if !users::referral_code_exists(conn, &code)? {
            return Ok(code);
        }
    }
    Err(TreeError::ReferralCodeExhausted)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}
