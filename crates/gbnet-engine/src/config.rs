//! Compensation settings shared by every engine operation.

use gbnet_bv::BvConfig;
use gbnet_commission::LevelTable;
use gbnet_salary::SlabTable;
use gbnet_stk::StkConfig;
use gbnet_tree::DirectPolicy;
use gbnet_wallet::WalletConfig;
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Tunable rules of the compensation plan.
///
/// Every table validates itself on deserialization; [`EngineConfig::validate`]
/// covers the remaining cross-field limits and runs once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which directs count toward commission unlocks.
    #[serde(default)]
    pub direct_policy: DirectPolicy,
    /// Decay table, retention and level depth for BV propagation.
    #[serde(default)]
    pub bv: BvConfig,
    /// Commission rate and unlock requirement per level.
    #[serde(default)]
    pub levels: LevelTable,
    /// Salary slabs and ranks.
    #[serde(default)]
    pub slabs: SlabTable,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub stk: StkConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.bv
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        self.wallet
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        self.stk
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        EngineConfig::default().validate().expect("valid");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: EngineConfig = toml::from_str("").expect("parse");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config: EngineConfig = toml::from_str(
            r#"
            direct_policy = "active"

            [wallet]
            transfer_tax_bps = 1000

            [bv]
            retention_months = 3
            "#,
        )
        .expect("parse");
        assert_eq!(config.direct_policy, DirectPolicy::Active);
        assert_eq!(config.wallet.transfer_tax_bps, 1_000);
        assert_eq!(config.wallet.min_withdrawal, WalletConfig::default().min_withdrawal);
        assert_eq!(config.bv.retention_months, 3);
    }

    #[test]
    fn test_bad_decay_table_rejected_on_parse() {
        // increasing with depth
        let parsed = toml::from_str::<EngineConfig>(
            "[bv]\ndecay = [100, 200, 0, 0, 0, 0, 0, 0, 0, 0]\n",
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_catches_zero_retention() {
        let mut config = EngineConfig::default();
        config.bv.retention_months = 0;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_round_trip() {
        let text = toml::to_string(&EngineConfig::default()).expect("serialize");
        let back: EngineConfig = toml::from_str(&text).expect("parse");
        assert_eq!(back, EngineConfig::default());
    }
}
