//! Ledger records: BV entries, commissions, wallet and STK transactions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Bps, CentiBv, MicroStk, Paise, ParseEnumError, Timestamp};

/// Implements `as_str` and `FromStr` for a fieldless enum stored as text.
macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ParseEnumError::new($kind, other)),
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Lifecycle of a BV entry. Only the maintenance sweep moves it forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BvStatus {
    Active,
    Expired,
}

text_enum!(BvStatus, "bv status", {
    Active => "active",
    Expired => "expired",
});

/// Business Volume credited to an upline member from a downline purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct BvEntry {
    pub id: i64,
    /// Beneficiary (upline member).
    pub user_code: String,
    /// Purchasing downline member.
    pub source_user_code: String,
    pub purchase_id: String,
    /// Distance from source to beneficiary, 1-based.
    pub level: u8,
    pub amount: CentiBv,
    pub created_at: Timestamp,
    pub expiry_date: Timestamp,
    pub status: BvStatus,
}

/// Outcome of evaluating a commission for a BV entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Paid,
    /// The earner lacked the direct referrals the level requires.
    Unqualified,
}

text_enum!(CommissionStatus, "commission status", {
    Paid => "paid",
    Unqualified => "unqualified",
});

/// A settled commission, one per BV entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct CommissionRecord {
    pub bv_entry_id: i64,
    pub user_code: String,
    pub level: u8,
    pub bv_amount: CentiBv,
    pub percentage_bps: Bps,
    pub required_directs: u32,
    pub directs_at_payout: u32,
    pub amount: Paise,
    pub status: CommissionStatus,
    pub created_at: Timestamp,
}

/// Kind of wallet movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WalletTxType {
    Deposit,
    Withdrawal,
    Topup,
    TransferIn,
    TransferOut,
    Commission,
    Salary,
    Purchase,
    StkSale,
    Refund,
}

text_enum!(WalletTxType, "wallet transaction type", {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Topup => "topup",
    TransferIn => "transfer_in",
    TransferOut => "transfer_out",
    Commission => "commission",
    Salary => "salary",
    Purchase => "purchase",
    StkSale => "stk_sale",
    Refund => "refund",
});

/// Settlement state of a wallet transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Completed,
    Rejected,
}

text_enum!(TxStatus, "transaction status", {
    Pending => "pending",
    Completed => "completed",
    Rejected => "rejected",
});

/// Which wallet bucket a transaction touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WalletBucket {
    Main,
    Topup,
}

text_enum!(WalletBucket, "wallet bucket", {
    Main => "main",
    Topup => "topup",
});

/// Audit row for every wallet movement.
///
/// `amount` is signed: credits positive, debits negative. Balances refer to
/// `bucket` and are captured inside the same SQL transaction as the change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct WalletTransaction {
    pub id: i64,
    pub user_code: String,
    pub tx_type: WalletTxType,
    pub bucket: WalletBucket,
    pub amount: i64,
    pub gross_amount: Paise,
    pub fee_amount: Paise,
    pub tds_amount: Paise,
    pub status: TxStatus,
    pub description: String,
    pub balance_before: Paise,
    pub balance_after: Paise,
    pub request_key: Option<String>,
    pub counterparty_code: Option<String>,
    pub created_at: Timestamp,
}

/// Wallet balances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct WalletBalance {
    /// Withdrawable.
    pub main_balance: Paise,
    /// Shopping only.
    pub topup_balance: Paise,
}

/// Kind of STK movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StkTxType {
    Purchase,
    Reward,
    ReferralBonus,
    Sell,
    Buy,
}

text_enum!(StkTxType, "stk transaction type", {
    Purchase => "purchase",
    Reward => "reward",
    ReferralBonus => "referral_bonus",
    Sell => "sell",
    Buy => "buy",
});

impl StkTxType {
    /// True for credits that settle straight into the available bucket.
    pub fn is_immediate_credit(self) -> bool {
        matches!(self, StkTxType::Purchase | StkTxType::Buy)
    }

    /// True for credits that enter the locked bucket as a lot.
    pub fn is_locked_credit(self) -> bool {
        matches!(self, StkTxType::Reward | StkTxType::ReferralBonus)
    }
}

/// Lock state of an STK transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    /// Not a lot (immediate credit or debit).
    None,
    Locked,
    Unlocked,
}

text_enum!(LotStatus, "lot status", {
    None => "none",
    Locked => "locked",
    Unlocked => "unlocked",
});

/// An STK ledger row. Locked credits double as lots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct StkTransaction {
    pub id: i64,
    pub user_code: String,
    pub tx_type: StkTxType,
    pub amount: MicroStk,
    pub lot_status: LotStatus,
    pub unlock_at: Option<Timestamp>,
    pub unlocked_at: Option<Timestamp>,
    pub description: String,
    pub created_at: Timestamp,
}

/// Dual-bucket STK balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct StkBalance {
    pub available: MicroStk,
    pub locked: MicroStk,
}

impl StkBalance {
    pub fn total(&self) -> MicroStk {
        self.available.saturating_add(self.locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_tx_type_text() {
        assert_eq!(WalletTxType::TransferOut.as_str(), "transfer_out");
        assert_eq!(
            "stk_sale".parse::<WalletTxType>().expect("parse"),
            WalletTxType::StkSale
        );
        assert!("bonus".parse::<WalletTxType>().is_err());
    }

    #[test]
    fn test_stk_credit_classes() {
        assert!(StkTxType::Purchase.is_immediate_credit());
        assert!(StkTxType::Buy.is_immediate_credit());
        assert!(StkTxType::Reward.is_locked_credit());
        assert!(StkTxType::ReferralBonus.is_locked_credit());
        assert!(!StkTxType::Sell.is_immediate_credit());
        assert!(!StkTxType::Sell.is_locked_credit());
    }

    #[test]
    fn test_stk_total() {
        let balance = StkBalance {
            available: 10,
            locked: 32,
        };
        assert_eq!(balance.total(), 42);
    }

    #[test]
    fn test_serde_matches_text() {
        let json = serde_json::to_string(&LotStatus::Unlocked).expect("serialize");
        assert_eq!(json, format!("\"{}\"", LotStatus::Unlocked.as_str()));
    }
}
