//! Product purchases: payment, BV propagation, commissions and STK.

use gbnet_db::queries::commerce::{self, NewOrder, OrderRow, ProductRow};
use gbnet_db::queries::{commissions, users};
use gbnet_db::DbError;
use gbnet_types::ledger::{BvEntry, CommissionRecord, StkTransaction, StkTxType, WalletTransaction};
use gbnet_types::{apply_bps, Paise, Session, Timestamp};
use rusqlite::Connection;
use serde::Serialize;

use crate::{in_transaction, require_active, EngineConfig, EngineError, Result};

const ORDER_COMPLETED: &str = "completed";

/// Outcome of a purchase.
#[derive(Clone, Debug, Serialize)]
pub struct PurchaseReceipt {
    pub order: OrderRow,
    /// Wallet debits, top-up bucket first. Empty on replay.
    pub payments: Vec<WalletTransaction>,
    pub bv_entries: Vec<BvEntry>,
    pub commissions: Vec<CommissionRecord>,
    pub stk_credit: Option<StkTransaction>,
    /// Locked STK credited to the buyer's sponsor on a first purchase.
    pub referral_bonus: Option<StkTransaction>,
    /// True when `request_key` matched an earlier purchase.
    pub replayed: bool,
}

/// Purchase id under which an order's BV entries are recorded.
pub fn purchase_id(order_id: i64) -> String {
    format!("ORD-{order_id}")
}

/// Active products.
pub fn list_products(conn: &Connection) -> Result<Vec<ProductRow>> {
    Ok(commerce::list_products(conn)?)
}

/// Buy `quantity` units of a product as the session's user.
///
/// In one transaction: the wallet is debited (top-up balance first), the
/// order is stored, the order's BV is propagated up the sponsor chain, each
/// new BV entry is settled into a commission, purchase STK is credited and,
/// on the buyer's first completed order, the direct sponsor receives a
/// locked referral bonus. Repeating a `request_key` returns the original
/// order without charging again.
pub fn submit_purchase(
    conn: &mut Connection,
    session: &Session,
    product_id: i64,
    quantity: u32,
    request_key: Option<&str>,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<PurchaseReceipt> {
    in_transaction(conn, |conn| {
        if let Some(key) = request_key {
            if let Some(order) = commerce::find_order_by_request_key(conn, key)? {
                if order.user_code != session.user_code {
                    return Err(EngineError::RequestKeyConflict(key.to_string()));
                }
                tracing::debug!(user = %session.user_code, order = order.id, "purchase replayed");
                return replay(conn, order);
            }
        }

        let buyer = require_active(conn, session)?;
        if quantity == 0 {
            return Err(EngineError::InvalidRequest("quantity must be positive".to_string()));
        }
        let product = match commerce::get_product(conn, product_id) {
            Ok(product) => product,
            Err(DbError::NotFound(_)) => return Err(EngineError::ProductNotFound(product_id)),
            Err(e) => return Err(e.into()),
        };
        if !product.is_active {
            return Err(EngineError::ProductInactive(product_id));
        }

        let units = u64::from(quantity);
        let net = product.price.checked_mul(units).ok_or(EngineError::Overflow)?;
        let gst = apply_bps(net, product.gst_bps).ok_or(EngineError::Overflow)?;
        let amount: Paise = net.checked_add(gst).ok_or(EngineError::Overflow)?;
        let bv = product.bv_credits.checked_mul(units).ok_or(EngineError::Overflow)?;
        let stk = product.stk_credits.checked_mul(units).ok_or(EngineError::Overflow)?;
        let first_purchase = commerce::completed_order_count(conn, &buyer.user_code)? == 0;

        let description = format!("{} x{quantity}", product.name);
        let payments = gbnet_wallet::debit_for_purchase(conn, &buyer.user_code, amount, &description, now)?;

        let order_id = commerce::insert_order(
            conn,
            &NewOrder {
                user_code: &buyer.user_code,
                product_id,
                quantity,
                amount,
                bv_credited: bv,
                stk_credited: stk,
                status: ORDER_COMPLETED,
                request_key,
                created_at: now,
            },
        )?;

        let (bv_entries, commissions) = if bv > 0 {
            let entries = gbnet_bv::record_purchase(
                conn,
                &buyer.user_code,
                bv,
                &purchase_id(order_id),
                now,
                &config.bv,
            )?;
            let records = gbnet_commission::settle_entries(
                conn,
                &entries,
                config.direct_policy,
                &config.levels,
                now,
            )?;
            (entries, records)
        } else {
            (Vec::new(), Vec::new())
        };

        let stk_credit = if stk > 0 {
            Some(gbnet_stk::credit(
                conn,
                &buyer.user_code,
                stk,
                StkTxType::Purchase,
                &description,
                now,
                &config.stk,
            )?)
        } else {
            None
        };

        let referral_bonus = if first_purchase {
            referral_bonus(conn, &buyer.user_code, now, config)?
        } else {
            None
        };

        tracing::info!(
            user = %buyer.user_code,
            order = order_id,
            amount,
            bv,
            stk,
            entries = bv_entries.len(),
            "purchase completed"
        );

        Ok(PurchaseReceipt {
            order: commerce::get_order(conn, order_id)?,
            payments,
            bv_entries,
            commissions,
            stk_credit,
            referral_bonus,
            replayed: false,
        })
    })
}

fn referral_bonus(
    conn: &Connection,
    buyer: &str,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<Option<StkTransaction>> {
    if config.stk.referral_bonus == 0 {
        return Ok(None);
    }
    let Some((sponsor, _)) = users::sponsor_of(conn, buyer)? else {
        return Ok(None);
    };
    if !users::get(conn, &sponsor)?.is_active {
        tracing::debug!(user = %sponsor, buyer, "referral bonus skipped for blocked sponsor");
        return Ok(None);
    }
    let credit = gbnet_stk::credit(
        conn,
        &sponsor,
        config.stk.referral_bonus,
        StkTxType::ReferralBonus,
        &format!("Referral bonus for {buyer}"),
        now,
        &config.stk,
    )?;
    Ok(Some(credit))
}

fn replay(conn: &Connection, order: OrderRow) -> Result<PurchaseReceipt> {
    let bv_entries = gbnet_bv::entries_for_purchase(conn, &purchase_id(order.id))?;
    let commissions = bv_entries
        .iter()
        .map(|entry| commissions::get_by_entry(conn, entry.id))
        .filter_map(|record| record.transpose())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(PurchaseReceipt {
        order,
        payments: Vec::new(),
        bv_entries,
        commissions,
        stk_credit: None,
        referral_bonus: None,
        replayed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{db, fund, root, starter_kit, under, T0};
    use gbnet_db::queries::{stk, wallet};
    use gbnet_tree::DirectPolicy;
    use gbnet_types::ledger::{CommissionStatus, LotStatus, WalletBucket};
    use gbnet_types::Side;

    fn active_policy() -> EngineConfig {
        EngineConfig {
            direct_policy: DirectPolicy::Active,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_purchase_end_to_end() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let b = under(&conn, "Bala", &a, Side::Left);
        let c = under(&conn, "Chitra", &b, Side::Left);
        let kit = starter_kit(&conn);
        fund(&conn, &c.user_code, WalletBucket::Topup, 30_000);
        fund(&conn, &c.user_code, WalletBucket::Main, 100_000);

        let receipt = submit_purchase(
            &mut conn,
            &Session::member(&c.user_code),
            kit,
            1,
            Some("buy-1"),
            T0,
            &active_policy(),
        )
        .expect("purchase");

        // top-up drained first, rest from main
        assert_eq!(receipt.payments.len(), 2);
        let balance = wallet::balance(&conn, &c.user_code).expect("balance");
        assert_eq!(balance.topup_balance, 0);
        assert_eq!(balance.main_balance, 30_000);

        // B at L1 gets 100 BV, A at L2 gets 50 BV
        assert_eq!(receipt.bv_entries.len(), 2);
        assert_eq!(receipt.bv_entries[0].user_code, b.user_code);
        assert_eq!(receipt.bv_entries[0].amount, 10_000);
        assert_eq!(receipt.bv_entries[1].amount, 5_000);

        // L1 open to all; A has one direct, L2 stays locked
        assert_eq!(receipt.commissions[0].status, CommissionStatus::Paid);
        assert_eq!(receipt.commissions[0].amount, 1_500);
        assert_eq!(receipt.commissions[1].status, CommissionStatus::Unqualified);
        assert_eq!(wallet::balance(&conn, &b.user_code).expect("balance").main_balance, 1_500);

        // purchase STK available, referral bonus locked for the sponsor
        let buyer_stk = stk::balance(&conn, &c.user_code).expect("stk");
        assert_eq!(buyer_stk.available, 10_000_000);
        let bonus = receipt.referral_bonus.expect("first purchase bonus");
        assert_eq!(bonus.user_code, b.user_code);
        assert_eq!(bonus.lot_status, LotStatus::Locked);
        assert_eq!(stk::balance(&conn, &b.user_code).expect("stk").locked, bonus.amount);
    }

    #[test]
    fn test_request_key_replays() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let b = under(&conn, "Bala", &a, Side::Left);
        let kit = starter_kit(&conn);
        fund(&conn, &b.user_code, WalletBucket::Main, 250_000);
        let session = Session::member(&b.user_code);
        let config = EngineConfig::default();

        let first = submit_purchase(&mut conn, &session, kit, 1, Some("k1"), T0, &config)
            .expect("first");
        let second = submit_purchase(&mut conn, &session, kit, 1, Some("k1"), T0 + 5, &config)
            .expect("second");
        assert!(second.replayed);
        assert_eq!(second.order, first.order);
        assert_eq!(second.bv_entries, first.bv_entries);
        assert_eq!(second.commissions, first.commissions);
        assert_eq!(wallet::balance(&conn, &b.user_code).expect("balance").main_balance, 150_000);

        let other = Session::member(&a.user_code);
        assert!(matches!(
            submit_purchase(&mut conn, &other, kit, 1, Some("k1"), T0, &config),
            Err(EngineError::RequestKeyConflict(_))
        ));
    }

    #[test]
    fn test_second_purchase_no_bonus() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let b = under(&conn, "Bala", &a, Side::Left);
        let kit = starter_kit(&conn);
        fund(&conn, &b.user_code, WalletBucket::Main, 200_000);
        let session = Session::member(&b.user_code);
        let config = EngineConfig::default();

        let first = submit_purchase(&mut conn, &session, kit, 1, None, T0, &config).expect("first");
        let second = submit_purchase(&mut conn, &session, kit, 1, None, T0, &config).expect("second");
        assert!(first.referral_bonus.is_some());
        assert!(second.referral_bonus.is_none());
    }

    #[test]
    fn test_insufficient_funds_changes_nothing() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let b = under(&conn, "Bala", &a, Side::Left);
        let kit = starter_kit(&conn);
        fund(&conn, &b.user_code, WalletBucket::Main, 99_999);

        let err = submit_purchase(
            &mut conn,
            &Session::member(&b.user_code),
            kit,
            1,
            None,
            T0,
            &EngineConfig::default(),
        )
        .expect_err("short");
        assert!(matches!(
            err,
            EngineError::Wallet(gbnet_wallet::WalletError::InsufficientBalance { .. })
        ));
        assert_eq!(commerce::completed_order_count(&conn, &b.user_code).expect("count"), 0);
        assert_eq!(gbnet_bv::active_bv_for(&conn, &a.user_code).expect("bv"), 0);
        assert_eq!(wallet::balance(&conn, &b.user_code).expect("balance").main_balance, 99_999);
    }

    #[test]
    fn test_gst_and_quantity() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let pid = commerce::insert_product(&conn, "Tonic", 50_000, 1_800, 2_500, 0, T0).expect("product");
        fund(&conn, &a.user_code, WalletBucket::Main, 200_000);

        let receipt = submit_purchase(
            &mut conn,
            &Session::member(&a.user_code),
            pid,
            3,
            None,
            T0,
            &EngineConfig::default(),
        )
        .expect("purchase");
        // 3 x Rs 500 + 18% GST
        assert_eq!(receipt.order.amount, 177_000);
        assert_eq!(receipt.order.bv_credited, 7_500);
        // root has no upline
        assert!(receipt.bv_entries.is_empty());
        assert!(receipt.stk_credit.is_none());
        assert!(receipt.referral_bonus.is_none());
    }

    #[test]
    fn test_rejects_bad_requests() {
        let mut conn = db();
        let a = root(&conn, "Asha");
        let kit = starter_kit(&conn);
        let session = Session::member(&a.user_code);
        let config = EngineConfig::default();
        assert!(matches!(
            submit_purchase(&mut conn, &session, kit, 0, None, T0, &config),
            Err(EngineError::InvalidRequest(_))
        ));
        assert!(matches!(
            submit_purchase(&mut conn, &session, 999, 1, None, T0, &config),
            Err(EngineError::ProductNotFound(999))
        ));
        users::set_active(&conn, &a.user_code, false).expect("block");
        assert!(matches!(
            submit_purchase(&mut conn, &session, kit, 1, None, T0, &config),
            Err(EngineError::AccountBlocked(_))
        ));
    }
}
