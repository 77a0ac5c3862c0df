//! Wallet limits and fee rates.

use gbnet_types::{Bps, Paise, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

use crate::{Result, WalletError};

/// Limits and rates applied by the wallet operations. Amounts in paise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_min_withdrawal")]
    pub min_withdrawal: Paise,
    #[serde(default = "default_max_withdrawal")]
    pub max_withdrawal: Paise,
    /// Processing fee withheld from a withdrawal.
    #[serde(default = "default_withdrawal_fee_bps")]
    pub withdrawal_fee_bps: Bps,
    /// Tax deducted at source on a withdrawal.
    #[serde(default = "default_tds_bps")]
    pub tds_bps: Bps,
    /// Tax charged to the sender on top of a transfer.
    #[serde(default = "default_transfer_tax_bps")]
    pub transfer_tax_bps: Bps,
    #[serde(default = "default_min_topup")]
    pub min_topup: Paise,
    #[serde(default = "default_min_deposit")]
    pub min_deposit: Paise,
}

fn default_min_withdrawal() -> Paise {
    50_000
}

fn default_max_withdrawal() -> Paise {
    10_000_000
}

fn default_withdrawal_fee_bps() -> Bps {
    500
}

fn default_tds_bps() -> Bps {
    500
}

fn default_transfer_tax_bps() -> Bps {
    800
}

fn default_min_topup() -> Paise {
    10_000
}

fn default_min_deposit() -> Paise {
    10_000
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            min_withdrawal: default_min_withdrawal(),
            max_withdrawal: default_max_withdrawal(),
            withdrawal_fee_bps: default_withdrawal_fee_bps(),
            tds_bps: default_tds_bps(),
            transfer_tax_bps: default_transfer_tax_bps(),
            min_topup: default_min_topup(),
            min_deposit: default_min_deposit(),
        }
    }
}

impl WalletConfig {
    /// Reject limits that could never be satisfied and rates that would
    /// swallow a whole withdrawal.
    pub fn validate(&self) -> Result<()> {
        if self.min_withdrawal == 0 || self.min_withdrawal > self.max_withdrawal {
            return Err(WalletError::InvalidAmount(format!(
                "withdrawal limits {}..={} are empty",
                self.min_withdrawal, self.max_withdrawal
            )));
        }
        let withheld = u64::from(self.withdrawal_fee_bps) + u64::from(self.tds_bps);
        if withheld >= BPS_DENOMINATOR {
            return Err(WalletError::InvalidAmount(format!(
                "withdrawal fee plus TDS is {withheld} bps"
            )));
        }
        if u64::from(self.transfer_tax_bps) > BPS_DENOMINATOR {
            return Err(WalletError::InvalidAmount(format!(
                "transfer tax is {} bps",
                self.transfer_tax_bps
            )));
        }
        Ok(())
    }
}
