//! Level table and the pure commission formula.

use gbnet_tree::MAX_DIRECTS;
use gbnet_types::ledger::BvEntry;
use gbnet_types::{apply_bps, Bps, Paise, BPS_DENOMINATOR, MAX_BV_LEVELS};
use serde::{Deserialize, Serialize};

use crate::{CommissionError, Result};

/// Commission rate and unlock requirement of one level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRule {
    pub percentage_bps: Bps,
    /// Direct referrals needed before this level pays.
    pub required_directs: u32,
}

const fn rule(percentage_bps: Bps, required_directs: u32) -> LevelRule {
    LevelRule {
        percentage_bps,
        required_directs,
    }
}

/// Default rules: L1 15% open to all; L2 5%, L3 4%, L4 3%, L5 2% and 1%
/// for L6-L10, each needing a qualifying direct on both sides.
pub const DEFAULT_LEVELS: [LevelRule; MAX_BV_LEVELS] = [
    rule(1_500, 0),
    rule(500, 2),
    rule(400, 2),
    rule(300, 2),
    rule(200, 2),
    rule(100, 2),
    rule(100, 2),
    rule(100, 2),
    rule(100, 2),
    rule(100, 2),
];

/// Ten level rules with non-decreasing unlock requirements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LevelRule>", into = "Vec<LevelRule>")]
pub struct LevelTable {
    rules: [LevelRule; MAX_BV_LEVELS],
}

impl LevelTable {
    /// Build a validated table.
    ///
    /// # Errors
    ///
    /// - [`CommissionError::InvalidLevelTable`] if there are not ten levels, a
    ///   rate exceeds 100%, a level needs fewer directs than the one above, or
    ///   a level needs more directs than a binary position can have
    pub fn new(rules: &[LevelRule]) -> Result<Self> {
        let rules: [LevelRule; MAX_BV_LEVELS] = rules.try_into().map_err(|_| {
            CommissionError::InvalidLevelTable(format!(
                "expected {MAX_BV_LEVELS} levels, got {}",
                rules.len()
            ))
        })?;
        if let Some(i) = rules
            .iter()
            .position(|r| u64::from(r.percentage_bps) > BPS_DENOMINATOR)
        {
            return Err(CommissionError::InvalidLevelTable(format!(
                "level {} pays more than 100%",
                i + 1
            )));
        }
        if let Some(i) = rules
            .iter()
            .position(|r| r.required_directs > MAX_DIRECTS)
        {
            return Err(CommissionError::InvalidLevelTable(format!(
                "level {} needs {} directs, at most {MAX_DIRECTS} are possible",
                i + 1,
                rules[i].required_directs
            )));
        }
        if let Some(i) = rules
            .windows(2)
            .position(|w| w[1].required_directs < w[0].required_directs)
        {
            return Err(CommissionError::InvalidLevelTable(format!(
                "level {} needs fewer directs than level {}",
                i + 2,
                i + 1
            )));
        }
        Ok(Self { rules })
    }

    /// Rule for a 1-based level.
    pub fn rule(&self, level: u8) -> Option<&LevelRule> {
        let idx = usize::from(level).checked_sub(1)?;
        self.rules.get(idx)
    }

    /// Deepest level `direct_count` directs unlock, 0 if none.
    pub fn unlocked_depth(&self, direct_count: u32) -> u8 {
        self.rules
            .iter()
            .take_while(|r| direct_count >= r.required_directs)
            .count() as u8
    }

    pub fn rules(&self) -> &[LevelRule] {
        &self.rules
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            rules: DEFAULT_LEVELS,
        }
    }
}

impl TryFrom<Vec<LevelRule>> for LevelTable {
    type Error = CommissionError;

    fn try_from(rules: Vec<LevelRule>) -> Result<Self> {
        Self::new(&rules)
    }
}

impl From<LevelTable> for Vec<LevelRule> {
    fn from(table: LevelTable) -> Self {
        table.rules.to_vec()
    }
}

/// Commission owed on `entry` to a beneficiary with `direct_count` directs.
///
/// Zero when the level is still locked. Pure: the same inputs always give
/// the same amount. BV is valued at one rupee, so the centi-BV amount times
/// the rate is already paise.
pub fn compute_commission(direct_count: u32, entry: &BvEntry, table: &LevelTable) -> Result<Paise> {
    let rule = table
        .rule(entry.level)
        .ok_or(CommissionError::UnknownLevel(entry.level))?;
    if direct_count < rule.required_directs {
        return Ok(0);
    }
    apply_bps(entry.amount, rule.percentage_bps).ok_or(CommissionError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gbnet_types::ledger::BvStatus;

    fn entry(level: u8, amount: u64) -> BvEntry {
        BvEntry {
            id: 1,
            user_code: "GB00001".to_string(),
            source_user_code: "GB00002".to_string(),
            purchase_id: "ORD-1".to_string(),
            level,
            amount,
            created_at: 0,
            expiry_date: 1,
            status: BvStatus::Active,
        }
    }

    #[test]
    fn test_level_one_always_open() {
        let table = LevelTable::default();
        assert_eq!(compute_commission(0, &entry(1, 10_000), &table).expect("commission"), 1_500);
    }

    #[test]
    fn test_locked_level_pays_nothing() {
        let table = LevelTable::default();
        assert_eq!(compute_commission(1, &entry(2, 5_000), &table).expect("commission"), 0);
        assert_eq!(compute_commission(2, &entry(2, 5_000), &table).expect("commission"), 250);
    }

    #[test]
    fn test_deep_levels() {
        let table = LevelTable::default();
        assert_eq!(compute_commission(1, &entry(10, 500), &table).expect("commission"), 0);
        assert_eq!(compute_commission(2, &entry(10, 500), &table).expect("commission"), 5);
        assert_eq!(compute_commission(2, &entry(3, 2_500), &table).expect("commission"), 100);
        assert!(matches!(
            compute_commission(10, &entry(11, 500), &table),
            Err(CommissionError::UnknownLevel(11))
        ));
    }

    #[test]
    fn test_unlocked_depth() {
        let table = LevelTable::default();
        assert_eq!(table.unlocked_depth(0), 1);
        assert_eq!(table.unlocked_depth(1), 1);
        assert_eq!(table.unlocked_depth(MAX_DIRECTS), 10);
    }

    #[test]
    fn test_rejects_unreachable_requirements() {
        let mut rules = DEFAULT_LEVELS;
        rules[9].required_directs = MAX_DIRECTS + 1;
        assert!(matches!(
            LevelTable::new(&rules),
            Err(CommissionError::InvalidLevelTable(_))
        ));
        // a config file cannot smuggle one in either
        let json = serde_json::to_string(&rules.to_vec()).expect("serialize");
        assert!(serde_json::from_str::<LevelTable>(&json).is_err());
    }

    #[test]
    fn test_rejects_decreasing_requirements() {
        let mut rules = DEFAULT_LEVELS;
        rules[5].required_directs = 1;
        assert!(matches!(
            LevelTable::new(&rules),
            Err(CommissionError::InvalidLevelTable(_))
        ));
        assert!(LevelTable::new(&rules[..9]).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&LevelTable::default()).expect("serialize");
        let back: LevelTable = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, LevelTable::default());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_commission_deterministic_and_bounded(
                directs in 0u32..20,
                level in 1u8..=10,
                amount in 0u64..=1_000_000_000,
            ) {
                let table = LevelTable::default();
                let e = entry(level, amount);
                let first = compute_commission(directs, &e, &table).expect("commission");
                let second = compute_commission(directs, &e, &table).expect("commission");
                prop_assert_eq!(first, second);
                prop_assert!(first <= amount);
            }

            #[test]
            fn prop_more_directs_never_pay_less(
                directs in 0u32..20,
                level in 1u8..=10,
                amount in 0u64..=1_000_000_000,
            ) {
                let table = LevelTable::default();
                let e = entry(level, amount);
                let fewer = compute_commission(directs, &e, &table).expect("commission");
                let more = compute_commission(directs + 1, &e, &table).expect("commission");
                prop_assert!(more >= fewer);
            }
        }
    }
}
