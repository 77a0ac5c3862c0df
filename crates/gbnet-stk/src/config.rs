//! STK configuration.

use gbnet_types::{MicroStk, Paise, MICRO_STK_PER_STK, STK_LOCK_MONTHS};
use serde::{Deserialize, Serialize};

use crate::{Result, StkError};

/// STK rules loaded from the `[stk]` config section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StkConfig {
    /// Calendar months a locked lot waits before unlocking.
    #[serde(default = "default_lock_months")]
    pub lock_months: u32,
    /// Locked STK credited to the direct sponsor on a member's first purchase.
    #[serde(default = "default_referral_bonus")]
    pub referral_bonus: MicroStk,
    /// Wallet value of one whole STK when sold.
    #[serde(default = "default_price")]
    pub price_per_stk: Paise,
}

fn default_lock_months() -> u32 {
    STK_LOCK_MONTHS
}

fn default_referral_bonus() -> MicroStk {
    50 * MICRO_STK_PER_STK
}

fn default_price() -> Paise {
    1_000
}

impl Default for StkConfig {
    fn default() -> Self {
        Self {
            lock_months: default_lock_months(),
            referral_bonus: default_referral_bonus(),
            price_per_stk: default_price(),
        }
    }
}

impl StkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lock_months == 0 {
            return Err(StkError::InvalidConfig("lock_months must be positive".to_string()));
        }
        if self.price_per_stk == 0 {
            return Err(StkError::InvalidConfig("price_per_stk must be positive".to_string()));
        }
        Ok(())
    }

    /// Wallet proceeds of selling `amount`, rounded down to the paisa.
    pub fn sale_value(&self, amount: MicroStk) -> Result<Paise> {
        let value = u128::from(amount) * u128::from(self.price_per_stk)
            / u128::from(MICRO_STK_PER_STK);
        Paise::try_from(value).map_err(|_| StkError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StkConfig::default();
        assert_eq!(config.lock_months, 15);
        config.validate().expect("valid");
    }

    #[test]
    fn test_sale_value_rounds_down() {
        let config = StkConfig::default();
        // 2.5 STK at Rs 10
        assert_eq!(config.sale_value(2_500_000).expect("value"), 2_500);
        // one micro-STK is worth less than a paisa
        assert_eq!(config.sale_value(1).expect("value"), 0);
    }

    #[test]
    fn test_partial_toml() {
        let config: StkConfig = toml::from_str("price_per_stk = 2500").expect("parse");
        assert_eq!(config.price_per_stk, 2_500);
        assert_eq!(config.lock_months, 15);
    }

    #[test]
    fn test_rejects_zero_lock() {
        let config = StkConfig {
            lock_months: 0,
            ..StkConfig::default()
        };
        assert!(matches!(config.validate(), Err(StkError::InvalidConfig(_))));
    }
}
