//! Recording purchases and expiring entries.

use gbnet_db::queries::bv::{self, NewBvEntry};
use gbnet_db::DbError;
use gbnet_types::ledger::BvEntry;
use gbnet_types::time::add_months;
use gbnet_types::{CentiBv, Timestamp, BV_RETENTION_MONTHS, MAX_BV_LEVELS};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{BvError, DecayTable, Result};

/// BV propagation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BvConfig {
    #[serde(default)]
    pub decay: DecayTable,
    /// How long an entry stays active.
    #[serde(default = "default_retention_months")]
    pub retention_months: u32,
    /// Sponsor levels a purchase reaches (at most 10).
    #[serde(default = "default_max_levels")]
    pub max_levels: u8,
}

fn default_retention_months() -> u32 {
    BV_RETENTION_MONTHS
}

fn default_max_levels() -> u8 {
    MAX_BV_LEVELS as u8
}

impl Default for BvConfig {
    fn default() -> Self {
        Self {
            decay: DecayTable::default(),
            retention_months: default_retention_months(),
            max_levels: default_max_levels(),
        }
    }
}

impl BvConfig {
    /// Check the settings that the decay table itself cannot.
    pub fn validate(&self) -> Result<()> {
        if self.max_levels == 0 || usize::from(self.max_levels) > MAX_BV_LEVELS {
            return Err(BvError::InvalidDecayTable(format!(
                "max_levels must be 1..={MAX_BV_LEVELS}, got {}",
                self.max_levels
            )));
        }
        if self.retention_months == 0 {
            return Err(BvError::InvalidDecayTable(
                "retention_months must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Propagate a purchase's BV up the buyer's sponsor chain.
///
/// Creates exactly one active entry per ancestor (up to `max_levels`),
/// expiring `retention_months` after `now`. Either every entry is written or
/// none is.
///
/// # Errors
///
/// - [`BvError::InvalidPurchase`] if `base_bv` is zero or the purchase id is empty
/// - [`BvError::DuplicatePurchase`] if the purchase id was already recorded
/// - [`BvError::Tree`] if the buyer does not exist
pub fn record_purchase(
    conn: &Connection,
    buyer_code: &str,
    base_bv: CentiBv,
    purchase_id: &str,
    now: Timestamp,
    config: &BvConfig,
) -> Result<Vec<BvEntry>> {
    if base_bv == 0 {
        return Err(BvError::InvalidPurchase("purchase carries no BV".to_string()));
    }
    if purchase_id.is_empty() {
        return Err(BvError::InvalidPurchase("empty purchase id".to_string()));
    }
    let expiry_date = add_months(now, config.retention_months).ok_or(BvError::Overflow)?;

    gbnet_db::with_savepoint(conn, "record_purchase", |conn| {
        if bv::purchase_recorded(conn, purchase_id)? {
            return Err(BvError::DuplicatePurchase(purchase_id.to_string()));
        }

        let chain = gbnet_tree::ancestor_chain(conn, buyer_code, config.max_levels)?;
        for ancestor in chain.iter() {
            let ancestor = ancestor?;
            let amount = config
                .decay
                .amount_at(ancestor.level, base_bv)
                .ok_or(BvError::Overflow)?;

            let inserted = bv::insert_entry(
                conn,
                &NewBvEntry {
                    user_code: &ancestor.user_code,
                    source_user_code: buyer_code,
                    purchase_id,
                    level: ancestor.level,
                    amount,
                    created_at: now,
                    expiry_date,
                },
            );
            match inserted {
                Ok(_) => {}
                Err(DbError::Constraint(_)) => {
                    return Err(BvError::DuplicatePurchase(purchase_id.to_string()))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    })?;

    let entries = bv::entries_for_purchase(conn, purchase_id)?;
    tracing::info!(
        buyer = %buyer_code,
        purchase_id,
        base_bv,
        levels = entries.len(),
        expiry_date,
        "BV propagated"
    );
    Ok(entries)
}

/// Expire every active entry whose expiry date has passed.
///
/// Returns the number of entries transitioned. A second run at the same
/// `now` returns zero.
pub fn expire_stale_entries(conn: &Connection, now: Timestamp) -> Result<usize> {
    let expired = bv::expire_due(conn, now)?;
    if expired > 0 {
        tracing::info!(expired, now, "BV entries expired");
    } else {
        tracing::debug!(now, "no BV entries due for expiry");
    }
    Ok(expired)
}

/// All active BV credited to a user.
pub fn active_bv_for(conn: &Connection, user_code: &str) -> Result<CentiBv> {
    Ok(bv::active_total(conn, user_code)?)
}

/// Entries a purchase created, by level.
pub fn entries_for_purchase(conn: &Connection, purchase_id: &str) -> Result<Vec<BvEntry>> {
    Ok(bv::entries_for_purchase(conn, purchase_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gbnet_db::queries::users;
    use gbnet_types::ledger::BvStatus;
    use gbnet_types::Side;

    /// 2024-01-15T00:00:00Z
    const T0: u64 = 1_705_276_800;
    /// 2024-07-15T00:00:00Z
    const T0_PLUS_6_MONTHS: u64 = 1_721_001_600;

    fn add(conn: &Connection, code: &str, sponsor: Option<(&str, Side)>) {
        users::insert(conn, code, code, &format!("{code}@example.com"), &format!("R{code}"), 1)
            .expect("insert user");
        users::set_placement(conn, code, sponsor, 1).expect("place user");
    }

    /// Straight line of `n` users, GB00001 at the top.
    fn line(n: usize) -> Connection {
        let conn = gbnet_db::open_memory().expect("open test db");
        add(&conn, "GB00001", None);
        for i in 2..=n {
            let parent = format!("GB{:05}", i - 1);
            add(&conn, &format!("GB{i:05}"), Some((parent.as_str(), Side::Right)));
        }
        conn
    }

    #[test]
    fn test_scenario_abc() {
        // A sponsors B (left) and C (right); B buys 100 BV.
        let conn = gbnet_db::open_memory().expect("open test db");
        add(&conn, "GB00001", None);
        add(&conn, "GB00002", Some(("GB00001", Side::Left)));
        add(&conn, "GB00003", Some(("GB00001", Side::Right)));

        let entries =
            record_purchase(&conn, "GB00002", 10_000, "ORD-1", T0, &BvConfig::default())
                .expect("record");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_code, "GB00001");
        assert_eq!(entries[0].level, 1);
        assert_eq!(entries[0].amount, 10_000);
        assert_eq!(entries[0].expiry_date, T0_PLUS_6_MONTHS);
        assert_eq!(entries[0].status, BvStatus::Active);
    }

    #[test]
    fn test_caps_at_ten_levels() {
        let conn = line(13);
        let entries = record_purchase(&conn, "GB00013", 10_000, "ORD-1", T0, &BvConfig::default())
            .expect("record");
        assert_eq!(entries.len(), 10);
        let amounts: Vec<u64> = entries.iter().map(|e| e.amount).collect();
        assert_eq!(
            amounts,
            vec![10_000, 5_000, 2_500, 2_000, 1_500, 1_000, 1_000, 500, 500, 500]
        );
        assert_eq!(entries[9].user_code, "GB00003");
    }

    #[test]
    fn test_root_purchase_creates_nothing() {
        let conn = line(1);
        let entries = record_purchase(&conn, "GB00001", 10_000, "ORD-1", T0, &BvConfig::default())
            .expect("record");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_zero_bv_rejected() {
        let conn = line(2);
        assert!(matches!(
            record_purchase(&conn, "GB00002", 0, "ORD-1", T0, &BvConfig::default()),
            Err(BvError::InvalidPurchase(_))
        ));
    }

    #[test]
    fn test_duplicate_purchase_rejected() {
        let conn = line(3);
        record_purchase(&conn, "GB00003", 10_000, "ORD-1", T0, &BvConfig::default())
            .expect("first");
        assert!(matches!(
            record_purchase(&conn, "GB00003", 10_000, "ORD-1", T0, &BvConfig::default()),
            Err(BvError::DuplicatePurchase(_))
        ));
        assert_eq!(entries_for_purchase(&conn, "ORD-1").expect("entries").len(), 2);
    }

    #[test]
    fn test_unknown_buyer() {
        let conn = line(1);
        assert!(matches!(
            record_purchase(&conn, "GB00042", 10_000, "ORD-1", T0, &BvConfig::default()),
            Err(BvError::Tree(_))
        ));
    }

    #[test]
    fn test_expiry_boundary_and_idempotence() {
        let conn = line(2);
        record_purchase(&conn, "GB00002", 10_000, "ORD-1", T0, &BvConfig::default())
            .expect("record");

        assert_eq!(expire_stale_entries(&conn, T0_PLUS_6_MONTHS - 1).expect("sweep"), 0);
        assert_eq!(active_bv_for(&conn, "GB00001").expect("active"), 10_000);

        assert_eq!(expire_stale_entries(&conn, T0_PLUS_6_MONTHS).expect("sweep"), 1);
        assert_eq!(expire_stale_entries(&conn, T0_PLUS_6_MONTHS).expect("sweep"), 0);
        assert_eq!(active_bv_for(&conn, "GB00001").expect("active"), 0);

        let entries = entries_for_purchase(&conn, "ORD-1").expect("entries");
        assert_eq!(entries[0].status, BvStatus::Expired);
    }

    #[test]
    fn test_config_validation() {
        let mut config = BvConfig::default();
        config.validate().expect("default valid");
        config.max_levels = 11;
        assert!(config.validate().is_err());
        config.max_levels = 3;
        config.retention_months = 0;
        assert!(config.validate().is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(48))]

            #[test]
            fn prop_one_entry_per_level_non_increasing(
                depth in 0usize..=13,
                base in 1u64..=1_000_000_000,
            ) {
                let conn = line(depth + 1);
                let buyer = format!("GB{:05}", depth + 1);
                let table = DecayTable::default();
                let entries = record_purchase(&conn, &buyer, base, "P", T0, &BvConfig::default())
                    .expect("record");

                prop_assert_eq!(entries.len(), depth.min(MAX_BV_LEVELS));
                for (i, entry) in entries.iter().enumerate() {
                    prop_assert_eq!(usize::from(entry.level), i + 1);
                    prop_assert_eq!(Some(entry.amount), table.amount_at(entry.level, base));
                }
                for pair in entries.windows(2) {
                    prop_assert!(pair[1].amount <= pair[0].amount);
                }
            }
        }
    }
}
