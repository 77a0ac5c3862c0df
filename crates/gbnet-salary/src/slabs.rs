//! Salary slabs, rank resolution and eligibility.

use gbnet_types::{apply_bps, Bps, CentiBv, Paise, BPS_DENOMINATOR, CENTI_BV_PER_BV};
use serde::{Deserialize, Serialize};

use crate::{Result, SalaryError};

/// How a slab's monthly salary is computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlabPay {
    /// A fixed amount in paise.
    Fixed { amount: Paise },
    /// A share of company turnover for the month.
    CtoShare { bps: Bps },
}

/// One salary slab. Bounds are inclusive, in centi-BV.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalarySlab {
    pub level: u8,
    /// Rank earned by completing this slab.
    pub name: String,
    pub min_bv: CentiBv,
    /// `None` only for the top slab.
    pub max_bv: Option<CentiBv>,
    pub pay: SlabPay,
}

impl SalarySlab {
    fn contains(&self, balanced: CentiBv) -> bool {
        balanced >= self.min_bv && self.max_bv.map_or(true, |max| balanced <= max)
    }
}

/// Ordered, contiguous slabs plus the rank held below the first one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSlabTable", into = "RawSlabTable")]
pub struct SlabTable {
    base_rank: String,
    slabs: Vec<SalarySlab>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawSlabTable {
    base_rank: String,
    slabs: Vec<SalarySlab>,
}

impl SlabTable {
    /// Build a validated table.
    ///
    /// # Errors
    ///
    /// - [`SalaryError::InvalidSlabTable`] unless levels run 1, 2, 3...,
    ///   each slab starts one centi-BV after the previous ends, only the last
    ///   slab is unbounded and no CTO share exceeds 100%
    pub fn new(base_rank: impl Into<String>, slabs: Vec<SalarySlab>) -> Result<Self> {
        let invalid = |msg: String| Err(SalaryError::InvalidSlabTable(msg));
        if slabs.is_empty() {
            return invalid("no slabs".to_string());
        }
        for (i, slab) in slabs.iter().enumerate() {
            let is_last = i + 1 == slabs.len();
            if usize::from(slab.level) != i + 1 {
                return invalid(format!("slab {} has level {}", i + 1, slab.level));
            }
            match (slab.max_bv, is_last) {
                (None, false) => return invalid(format!("slab {} is unbounded", slab.level)),
                (Some(_), true) => {
                    return invalid(format!("top slab {} must be unbounded", slab.level))
                }
                (Some(max), false) if max < slab.min_bv => {
                    return invalid(format!("slab {} ends before it starts", slab.level))
                }
                _ => {}
            }
            if let SlabPay::CtoShare { bps } = slab.pay {
                if u64::from(bps) > BPS_DENOMINATOR {
                    return invalid(format!("slab {} shares more than 100%", slab.level));
                }
            }
        }
        for pair in slabs.windows(2) {
            let expected = pair[0].max_bv.and_then(|max| max.checked_add(1));
            if expected != Some(pair[1].min_bv) {
                return invalid(format!(
                    "slab {} does not start where slab {} ends",
                    pair[1].level, pair[0].level
                ));
            }
        }
        Ok(Self {
            base_rank: base_rank.into(),
            slabs,
        })
    }

    pub fn slabs(&self) -> &[SalarySlab] {
        &self.slabs
    }

    pub fn base_rank(&self) -> &str {
        &self.base_rank
    }
}

fn fixed(level: u8, name: &str, min_bv: u64, max_bv: u64, rupees: u64) -> SalarySlab {
    SalarySlab {
        level,
        name: name.to_string(),
        min_bv: min_bv * CENTI_BV_PER_BV,
        max_bv: Some(max_bv * CENTI_BV_PER_BV + 99),
        pay: SlabPay::Fixed {
            amount: rupees * gbnet_types::PAISE_PER_RUPEE,
        },
    }
}

impl Default for SlabTable {
    fn default() -> Self {
        Self {
            base_rank: "Associate".to_string(),
            slabs: vec![
                fixed(1, "Bronze", 1_000, 4_999, 2_000),
                fixed(2, "Silver", 5_000, 14_999, 5_000),
                fixed(3, "Gold", 15_000, 49_999, 15_000),
                fixed(4, "Platinum", 50_000, 149_999, 40_000),
                fixed(5, "Diamond", 150_000, 499_999, 100_000),
                SalarySlab {
                    level: 6,
                    name: "Crown Ambassador".to_string(),
                    min_bv: 500_000 * CENTI_BV_PER_BV,
                    max_bv: None,
                    pay: SlabPay::CtoShare { bps: 200 },
                },
            ],
        }
    }
}

impl TryFrom<RawSlabTable> for SlabTable {
    type Error = SalaryError;

    fn try_from(raw: RawSlabTable) -> Result<Self> {
        Self::new(raw.base_rank, raw.slabs)
    }
}

impl From<SlabTable> for RawSlabTable {
    fn from(table: SlabTable) -> Self {
        Self {
            base_rank: table.base_rank,
            slabs: table.slabs,
        }
    }
}

/// A member's rank. Level 0 is the base rank.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank {
    pub level: u8,
    pub name: String,
}

/// The slab whose range contains `balanced`, if any.
pub fn resolve_slab(balanced: CentiBv, table: &SlabTable) -> Option<&SalarySlab> {
    table.slabs.iter().find(|slab| slab.contains(balanced))
}

/// Rank of the highest slab fully completed: `balanced` at or above its
/// upper bound, or, for the unbounded top slab, at or above its lower bound.
pub fn resolve_rank(balanced: CentiBv, table: &SlabTable) -> Rank {
    table
        .slabs
        .iter()
        .rev()
        .find(|slab| match slab.max_bv {
            Some(max) => balanced >= max,
            None => balanced >= slab.min_bv,
        })
        .map(|slab| Rank {
            level: slab.level,
            name: slab.name.clone(),
        })
        .unwrap_or_else(|| Rank {
            level: 0,
            name: table.base_rank.clone(),
        })
}

/// Salary for one month in `slab`.
pub fn monthly_salary(slab: &SalarySlab, cto_volume: Paise) -> Result<Paise> {
    match slab.pay {
        SlabPay::Fixed { amount } => Ok(amount),
        SlabPay::CtoShare { bps } => apply_bps(cto_volume, bps).ok_or(SalaryError::Overflow),
    }
}

/// Where a member stands relative to the slab table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub balanced_bv: CentiBv,
    pub current_slab: Option<u8>,
    pub next_slab: Option<u8>,
    /// Balanced BV still missing for the next slab.
    pub bv_to_next: Option<CentiBv>,
    pub rank: Rank,
    pub message: String,
}

/// Format centi-BV as `1234.56 BV`.
pub fn format_bv(amount: CentiBv) -> String {
    format!(
        "{}.{:02} BV",
        amount / CENTI_BV_PER_BV,
        amount % CENTI_BV_PER_BV
    )
}

/// Report the current slab and the distance to the next one.
pub fn eligibility_check(balanced: CentiBv, table: &SlabTable) -> Eligibility {
    let current = resolve_slab(balanced, table);
    let next = table.slabs.iter().find(|slab| slab.min_bv > balanced);
    let bv_to_next = next.map(|slab| slab.min_bv - balanced);

    let message = match (current, next) {
        (None, Some(next)) => format!(
            "Salary locked: {} more needed to reach {}",
            format_bv(next.min_bv - balanced),
            next.name
        ),
        (Some(cur), Some(next)) => format!(
            "{} slab active; {} more needed to reach {}",
            cur.name,
            format_bv(next.min_bv - balanced),
            next.name
        ),
        (Some(cur), None) => format!("{} slab active; highest slab reached", cur.name),
        (None, None) => "Salary locked".to_string(),
    };

    Eligibility {
        balanced_bv: balanced,
        current_slab: current.map(|s| s.level),
        next_slab: next.map(|s| s.level),
        bv_to_next,
        rank: resolve_rank(balanced, table),
        message,
    }
}
