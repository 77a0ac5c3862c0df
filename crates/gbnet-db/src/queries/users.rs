//! Member and placement queries.

use gbnet_types::{KycStatus, Side, Timestamp, User};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::{get_u64, parse_column, to_i64, DbError, Result};

const USER_COLUMNS: &str = "user_code, name, email, sponsor_code, side, referral_code,
     kyc_status, is_active, created_at, placed_at";

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let side: Option<String> = row.get(4)?;
    Ok(User {
        user_code: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        sponsor_code: row.get(3)?,
        side: side.map(|s| parse_column(4, s)).transpose()?,
        referral_code: row.get(5)?,
        kyc_status: parse_column(6, row.get(6)?)?,
        is_active: row.get(7)?,
        created_at: get_u64(row, 8)?,
        placed_at: row
            .get::<_, Option<i64>>(9)?
            .map(|v| v.max(0) as u64),
    })
}

/// Next sequence number for a user code. Call inside the write transaction
/// that inserts the user.
pub fn next_user_seq(conn: &Connection) -> Result<u64> {
    let max: i64 = conn.query_row("SELECT COALESCE(MAX(id), 0) FROM users", [], |row| {
        row.get(0)
    })?;
    Ok(max as u64 + 1)
}

/// Insert a new, not yet placed user.
pub fn insert(
    conn: &Connection,
    user_code: &str,
    name: &str,
    email: &str,
    referral_code: &str,
    created_at: Timestamp,
) -> Result<()> {
    conn.execute(
        "INSERT INTO users (user_code, name, email, referral_code, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![user_code, name, email, referral_code, to_i64(created_at)?],
    )?;
    Ok(())
}

/// Fetch a user by code.
pub fn get(conn: &Connection, user_code: &str) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE user_code = ?1"),
        [user_code],
        map_user,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("user '{user_code}'")))
}

/// Look up a user by code, returning `None` if absent.
pub fn find(conn: &Connection, user_code: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE user_code = ?1"),
            [user_code],
            map_user,
        )
        .optional()?)
}

/// Resolve a referral code to its owner.
pub fn find_by_referral_code(conn: &Connection, referral_code: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE referral_code = ?1"),
            [referral_code],
            map_user,
        )
        .optional()?)
}

/// True if the referral code is already taken.
pub fn referral_code_exists(conn: &Connection, referral_code: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE referral_code = ?1)",
        [referral_code],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// True if the email is already registered.
pub fn email_exists(conn: &Connection, email: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 COLLATE NOCASE)",
        [email],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Fix a user's tree position. Only succeeds once per user.
///
/// Returns `false` if the user was already placed.
pub fn set_placement(
    conn: &Connection,
    user_code: &str,
    sponsor: Option<(&str, Side)>,
    placed_at: Timestamp,
) -> Result<bool> {
    let (sponsor_code, side) = match sponsor {
        Some((code, side)) => (Some(code), Some(side.as_str())),
        None => (None, None),
    };
    let updated = conn.execute(
        "UPDATE users SET sponsor_code = ?1, side = ?2, placed_at = ?3
         WHERE user_code = ?4 AND placed_at IS NULL",
        rusqlite::params![sponsor_code, side, to_i64(placed_at)?, user_code],
    )?;
    Ok(updated == 1)
}

/// Direct child occupying `(sponsor, side)`, if any.
pub fn child_at(conn: &Connection, sponsor_code: &str, side: Side) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT user_code FROM users WHERE sponsor_code = ?1 AND side = ?2",
            rusqlite::params![sponsor_code, side.as_str()],
            |row| row.get(0),
        )
        .optional()?)
}

/// Sponsor code and slot of a user. `None` for roots.
pub fn sponsor_of(conn: &Connection, user_code: &str) -> Result<Option<(String, Side)>> {
    let row: Option<(Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT sponsor_code, side FROM users WHERE user_code = ?1",
            [user_code],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Err(DbError::NotFound(format!("user '{user_code}'"))),
        Some((Some(code), Some(side))) => {
            let side = side
                .parse::<Side>()
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            Ok(Some((code, side)))
        }
        Some(_) => Ok(None),
    }
}

/// True if `ancestor` appears on the sponsor chain above `user_code`.
pub fn is_ancestor(conn: &Connection, ancestor: &str, user_code: &str) -> Result<bool> {
    let found: bool = conn.query_row(
        "WITH RECURSIVE chain(code) AS (
             SELECT sponsor_code FROM users WHERE user_code = ?2
             UNION
             SELECT u.sponsor_code FROM users u JOIN chain ON u.user_code = chain.code
         )
         SELECT EXISTS(SELECT 1 FROM chain WHERE code = ?1)",
        rusqlite::params![ancestor, user_code],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// Number of sponsors above a user. Roots are at depth 0.
pub fn depth(conn: &Connection, user_code: &str) -> Result<u32> {
    let depth: i64 = conn.query_row(
        "WITH RECURSIVE chain(code) AS (
             SELECT sponsor_code FROM users WHERE user_code = ?1
             UNION
             SELECT u.sponsor_code FROM users u JOIN chain ON u.user_code = chain.code
         )
         SELECT COUNT(*) FROM chain WHERE code IS NOT NULL",
        [user_code],
        |row| row.get(0),
    )?;
    Ok(depth as u32)
}

/// Number of members in the `side` leg below `user_code`.
pub fn leg_size(conn: &Connection, user_code: &str, side: Side) -> Result<u64> {
    let count: i64 = conn.query_row(
        "WITH RECURSIVE leg(code) AS (
             SELECT user_code FROM users WHERE sponsor_code = ?1 AND side = ?2
             UNION ALL
             SELECT u.user_code FROM users u JOIN leg ON u.sponsor_code = leg.code
         )
         SELECT COUNT(*) FROM leg",
        rusqlite::params![user_code, side.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Members of the `side` leg below `user_code`, breadth-first.
pub fn leg_members(conn: &Connection, user_code: &str, side: Side) -> Result<Vec<LegMemberRow>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE leg(code, depth) AS (
             SELECT user_code, 1 FROM users WHERE sponsor_code = ?1 AND side = ?2
             UNION ALL
             SELECT u.user_code, leg.depth + 1 FROM users u JOIN leg ON u.sponsor_code = leg.code
         )
         SELECT u.user_code, u.name, u.sponsor_code, u.side, leg.depth, u.is_active
         FROM leg JOIN users u ON u.user_code = leg.code
         ORDER BY leg.depth, u.id",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![user_code, side.as_str()], |row| {
            Ok(LegMemberRow {
                user_code: row.get(0)?,
                name: row.get(1)?,
                sponsor_code: row.get(2)?,
                side: parse_column(3, row.get(3)?)?,
                depth: row.get::<_, i64>(4)? as u32,
                is_active: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Count direct referrals.
///
/// Blocked users never count. With `require_purchase`, a direct counts only
/// once it has at least one completed order.
pub fn count_directs(conn: &Connection, user_code: &str, require_purchase: bool) -> Result<u32> {
    let sql = if require_purchase {
        "SELECT COUNT(*) FROM users u
         WHERE u.sponsor_code = ?1 AND u.is_active = 1
           AND EXISTS (SELECT 1 FROM orders o
                       WHERE o.user_code = u.user_code AND o.status = 'completed')"
    } else {
        "SELECT COUNT(*) FROM users u WHERE u.sponsor_code = ?1 AND u.is_active = 1"
    };
    let count: i64 = conn.query_row(sql, [user_code], |row| row.get(0))?;
    Ok(count as u32)
}

/// Update KYC status.
pub fn set_kyc_status(conn: &Connection, user_code: &str, status: KycStatus) -> Result<()> {
    let updated = conn.execute(
        "UPDATE users SET kyc_status = ?1 WHERE user_code = ?2",
        rusqlite::params![status.as_str(), user_code],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("user '{user_code}'")));
    }
    Ok(())
}

/// Soft block or unblock a user.
pub fn set_active(conn: &Connection, user_code: &str, active: bool) -> Result<()> {
    let updated = conn.execute(
        "UPDATE users SET is_active = ?1 WHERE user_code = ?2",
        rusqlite::params![active, user_code],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("user '{user_code}'")));
    }
    Ok(())
}

/// Codes of every active user, oldest first.
pub fn active_codes(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT user_code FROM users WHERE is_active = 1 ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(rows)
}

/// A member row in a leg listing.
#[derive(Debug, Clone, Serialize)]
pub struct LegMemberRow {
    pub user_code: String,
    pub name: String,
    pub sponsor_code: String,
    pub side: Side,
    /// Depth below the queried user, 1-based.
    pub depth: u32,
    pub is_active: bool,
}
