//! Lazy ancestor walks.
//!
//! [`AncestorChain`] fetches one sponsor row per step, so callers that stop
//! early (or a chain shorter than the cap) never read more than they need.
//! Each [`AncestorChain::iter`] call restarts at level 1.

use gbnet_db::queries::users;
use rusqlite::Connection;

use crate::{require_user, Result};

/// One step up the sponsor chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ancestor {
    pub user_code: String,
    /// 1 for the direct sponsor.
    pub level: u8,
}

/// The sponsor chain above a user, capped at `max_levels`.
#[derive(Clone, Debug)]
pub struct AncestorChain<'c> {
    conn: &'c Connection,
    user_code: String,
    max_levels: u8,
}

impl<'c> AncestorChain<'c> {
    /// Start a fresh walk from the direct sponsor.
    pub fn iter(&self) -> Ancestors<'c> {
        Ancestors {
            conn: self.conn,
            next_child: Some(self.user_code.clone()),
            level: 0,
            max_levels: self.max_levels,
        }
    }

    /// The user the chain starts below.
    pub fn user_code(&self) -> &str {
        &self.user_code
    }

    pub fn max_levels(&self) -> u8 {
        self.max_levels
    }
}

/// Iterator over an [`AncestorChain`].
///
/// Yields at most `max_levels` items and stops after the first error.
pub struct Ancestors<'c> {
    conn: &'c Connection,
    next_child: Option<String>,
    level: u8,
    max_levels: u8,
}

impl Iterator for Ancestors<'_> {
    type Item = Result<Ancestor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.level >= self.max_levels {
            return None;
        }
        let child = self.next_child.take()?;

        match users::sponsor_of(self.conn, &child) {
            Ok(Some((sponsor_code, _side))) => {
                self.level += 1;
                self.next_child = Some(sponsor_code.clone());
                Some(Ok(Ancestor {
                    user_code: sponsor_code,
                    level: self.level,
                }))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Build the ancestor chain of `user_code`, at most `max_levels` deep.
///
/// # Errors
///
/// - [`TreeError::UserNotFound`](crate::TreeError::UserNotFound) if the user does not exist
pub fn ancestor_chain<'c>(
    conn: &'c Connection,
    user_code: &str,
    max_levels: u8,
) -> Result<AncestorChain<'c>> {
    require_user(conn, user_code)?;
    Ok(AncestorChain {
        conn,
        user_code: user_code.to_string(),
        max_levels,
    })
}
