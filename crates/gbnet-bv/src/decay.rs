//! Per-level BV decay.

use gbnet_types::{apply_bps, Bps, CentiBv, BPS_DENOMINATOR, MAX_BV_LEVELS};
use serde::{Deserialize, Serialize};

use crate::{BvError, Result};

/// Default decay: 100%, 50%, 25%, 20%, 15%, 10%, 10%, 5%, 5%, 5%.
pub const DEFAULT_DECAY_BPS: [Bps; MAX_BV_LEVELS] =
    [10_000, 5_000, 2_500, 2_000, 1_500, 1_000, 1_000, 500, 500, 500];

/// Share of a purchase's BV each sponsor level receives, in basis points.
///
/// Always ten levels, each at most 100%, never increasing with depth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Bps>", into = "Vec<Bps>")]
pub struct DecayTable {
    bps: [Bps; MAX_BV_LEVELS],
}

impl DecayTable {
    /// Build a validated table.
    ///
    /// # Errors
    ///
    /// - [`BvError::InvalidDecayTable`] if there are not exactly ten levels,
    ///   a level exceeds 10 000 bps, or a level exceeds the one above it
    pub fn new(levels: &[Bps]) -> Result<Self> {
        let bps: [Bps; MAX_BV_LEVELS] = levels.try_into().map_err(|_| {
            BvError::InvalidDecayTable(format!(
                "expected {MAX_BV_LEVELS} levels, got {}",
                levels.len()
            ))
        })?;

        if let Some(level) = bps.iter().position(|&b| u64::from(b) > BPS_DENOMINATOR) {
            return Err(BvError::InvalidDecayTable(format!(
                "level {} exceeds 100%",
                level + 1
            )));
        }
        if let Some(pair) = bps.windows(2).position(|w| w[1] > w[0]) {
            return Err(BvError::InvalidDecayTable(format!(
                "level {} is larger than level {}",
                pair + 2,
                pair + 1
            )));
        }
        Ok(Self { bps })
    }

    /// Rate for a 1-based level, `None` outside 1..=10.
    pub fn rate(&self, level: u8) -> Option<Bps> {
        let idx = usize::from(level).checked_sub(1)?;
        self.bps.get(idx).copied()
    }

    /// BV a level receives from `base`. `None` on overflow or a bad level.
    pub fn amount_at(&self, level: u8, base: CentiBv) -> Option<CentiBv> {
        apply_bps(base, self.rate(level)?)
    }

    pub fn as_slice(&self) -> &[Bps] {
        &self.bps
    }
}

impl Default for DecayTable {
    fn default() -> Self {
        Self {
            bps: DEFAULT_DECAY_BPS,
        }
    }
}

impl TryFrom<Vec<Bps>> for DecayTable {
    type Error = BvError;

    fn try_from(levels: Vec<Bps>) -> Result<Self> {
        Self::new(&levels)
    }
}

impl From<DecayTable> for Vec<Bps> {
    fn from(table: DecayTable) -> Self {
        table.bps.to_vec()
    }
}
