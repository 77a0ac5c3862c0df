//! Product catalogue and order queries.

use gbnet_types::{Bps, CentiBv, MicroStk, Paise, Timestamp};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::{get_u64, to_i64, DbError, Result};

/// A catalogue product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    /// Price before GST.
    pub price: Paise,
    pub gst_bps: Bps,
    /// BV generated per unit.
    pub bv_credits: CentiBv,
    /// STK granted per unit.
    pub stk_credits: MicroStk,
    pub is_active: bool,
}

/// An order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    pub id: i64,
    pub user_code: String,
    pub product_id: i64,
    pub quantity: u32,
    pub amount: Paise,
    pub bv_credited: CentiBv,
    pub stk_credited: MicroStk,
    pub status: String,
    pub request_key: Option<String>,
    pub created_at: Timestamp,
}

fn map_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRow> {
    Ok(ProductRow {
        id: row.get(0)?,
        name: row.get(1)?,
        price: get_u64(row, 2)?,
        gst_bps: row.get(3)?,
        bv_credits: get_u64(row, 4)?,
        stk_credits: get_u64(row, 5)?,
        is_active: row.get(6)?,
    })
}

fn map_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        user_code: row.get(1)?,
        product_id: row.get(2)?,
        quantity: row.get(3)?,
        amount: get_u64(row, 4)?,
        bv_credited: get_u64(row, 5)?,
        stk_credited: get_u64(row, 6)?,
        status: row.get(7)?,
        request_key: row.get(8)?,
        created_at: get_u64(row, 9)?,
    })
}

const ORDER_COLUMNS: &str = "id, user_code, product_id, quantity, amount, bv_credited,
     stk_credited, status, request_key, created_at";

/// Insert a product and return its id.
pub fn insert_product(
    conn: &Connection,
    name: &str,
    price: Paise,
    gst_bps: Bps,
    bv_credits: CentiBv,
    stk_credits: MicroStk,
    now: Timestamp,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO products (name, price, gst_bps, bv_credits, stk_credits, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            name,
            to_i64(price)?,
            gst_bps,
            to_i64(bv_credits)?,
            to_i64(stk_credits)?,
            to_i64(now)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch a product.
pub fn get_product(conn: &Connection, id: i64) -> Result<ProductRow> {
    conn.query_row(
        "SELECT id, name, price, gst_bps, bv_credits, stk_credits, is_active
         FROM products WHERE id = ?1",
        [id],
        map_product,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("product {id}")))
}

/// Active products, by id.
pub fn list_products(conn: &Connection) -> Result<Vec<ProductRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, price, gst_bps, bv_credits, stk_credits, is_active
         FROM products WHERE is_active = 1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], map_product)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Fields of an order before it has an id.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub user_code: &'a str,
    pub product_id: i64,
    pub quantity: u32,
    pub amount: Paise,
    pub bv_credited: CentiBv,
    pub stk_credited: MicroStk,
    pub status: &'a str,
    pub request_key: Option<&'a str>,
    pub created_at: Timestamp,
}

/// Insert an order and return its id.
pub fn insert_order(conn: &Connection, order: &NewOrder<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO orders
             (user_code, product_id, quantity, amount, bv_credited, stk_credited, status,
              request_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            order.user_code,
            order.product_id,
            order.quantity,
            to_i64(order.amount)?,
            to_i64(order.bv_credited)?,
            to_i64(order.stk_credited)?,
            order.status,
            order.request_key,
            to_i64(order.created_at)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch an order by id.
pub fn get_order(conn: &Connection, id: i64) -> Result<OrderRow> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
        [id],
        map_order,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("order {id}")))
}

/// The order placed under an idempotency key, if any.
pub fn find_order_by_request_key(conn: &Connection, key: &str) -> Result<Option<OrderRow>> {
    Ok(conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE request_key = ?1"),
            [key],
            map_order,
        )
        .optional()?)
}

/// Number of completed orders a user has.
pub fn completed_order_count(conn: &Connection, user_code: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM orders WHERE user_code = ?1 AND status = 'completed'",
        [user_code],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Company turnover: completed order amounts in `[from, to)`.
pub fn turnover_between(conn: &Connection, from: Timestamp, to: Timestamp) -> Result<Paise> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM orders
         WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2",
        rusqlite::params![to_i64(from)?, to_i64(to)?],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users;

    fn test_db() -> Connection {
        let conn = crate::open_memory().expect("open test db");
        users::insert(&conn, "GB00001", "a", "a@x.io", "RA", 1).expect("user");
        conn
    }

    fn order(product_id: i64, amount: u64, created_at: u64, key: Option<&str>) -> NewOrder<'_> {
        NewOrder {
            user_code: "GB00001",
            product_id,
            quantity: 1,
            amount,
            bv_credited: 10_000,
            stk_credited: 0,
            status: "completed",
            request_key: key,
            created_at,
        }
    }

    #[test]
    fn test_product_round_trip() {
        let conn = test_db();
        let id = insert_product(&conn, "Starter kit", 100_000, 1_800, 10_000, 5_000_000, 1)
            .expect("insert");
        let product = get_product(&conn, id).expect("get");
        assert_eq!(product.name, "Starter kit");
        assert_eq!(product.gst_bps, 1_800);
        assert!(product.is_active);
        assert_eq!(list_products(&conn).expect("list").len(), 1);
    }

    #[test]
    fn test_orders_and_turnover() {
        let conn = test_db();
        let pid = insert_product(&conn, "Kit", 100_000, 0, 10_000, 0, 1).expect("product");
        insert_order(&conn, &order(pid, 100_000, 10, Some("k1"))).expect("order");
        insert_order(&conn, &order(pid, 50_000, 20, None)).expect("order");

        assert_eq!(completed_order_count(&conn, "GB00001").expect("count"), 2);
        assert_eq!(turnover_between(&conn, 0, 15).expect("turnover"), 100_000);
        assert_eq!(turnover_between(&conn, 0, 21).expect("turnover"), 150_000);

        let found = find_order_by_request_key(&conn, "k1").expect("find").expect("present");
        assert_eq!(found.amount, 100_000);
        assert!(insert_order(&conn, &order(pid, 1, 30, Some("k1"))).is_err());
    }
}
