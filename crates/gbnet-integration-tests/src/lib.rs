//! Integration test crate for the GBNet compensation engine.
//!
//! The library holds shared fixtures; the scenarios in `tests/` drive the
//! engine end to end the way the daemon does: registration, deposits
//! approved by an admin, purchases, maintenance and salary runs.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p gbnet-integration-tests
//! ```

use std::path::PathBuf;

use gbnet_engine::admin::{self, NewProduct};
use gbnet_engine::EngineConfig;
use gbnet_tree::Placement;
use gbnet_types::user::NewUserProfile;
use gbnet_types::{Paise, Session, Side, User, CENTI_BV_PER_BV, PAISE_PER_RUPEE};
use rusqlite::Connection;

/// 2024-01-15T00:00:00Z
pub const T0: u64 = 1_705_276_800;
/// 2024-02-01T00:00:00Z
pub const FEB_1: u64 = 1_706_745_600;
pub const DAY: u64 = 86_400;

pub fn rupees(n: u64) -> Paise {
    n * PAISE_PER_RUPEE
}

pub fn bv(n: u64) -> u64 {
    n * CENTI_BV_PER_BV
}

pub fn admin() -> Session {
    Session::admin("ADMIN")
}

pub fn db() -> Connection {
    gbnet_db::open_memory().expect("open test db")
}

/// A database file under the temp dir, removed on drop.
pub struct TempDb {
    pub path: PathBuf,
}

impl TempDb {
    pub fn new(tag: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "gbnet-{tag}-{}-{nanos}.db",
            std::process::id()
        ));
        gbnet_db::open(&path).expect("create db");
        Self { path }
    }

    pub fn connect(&self) -> Connection {
        gbnet_db::open(&self.path).expect("open db")
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            let _ = std::fs::remove_file(name);
        }
    }
}

fn profile(name: &str) -> NewUserProfile {
    NewUserProfile {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
    }
}

pub fn register_root(conn: &mut Connection, name: &str) -> User {
    gbnet_engine::register_user(conn, &profile(name), &Placement::Root, T0).expect("register root")
}

pub fn register_under(conn: &mut Connection, name: &str, sponsor: &User, side: Side) -> User {
    let placement = Placement::Sponsored {
        referral_code: sponsor.referral_code.clone(),
        side,
    };
    gbnet_engine::register_user(conn, &profile(name), &placement, T0).expect("register")
}

/// Deposit `amount` and have an admin approve it.
pub fn fund(conn: &mut Connection, user: &User, amount: Paise) {
    let config = EngineConfig::default();
    let tx = gbnet_engine::submit_deposit(
        conn,
        &Session::member(&user.user_code),
        amount,
        "UTR-TEST",
        None,
        T0,
        &config,
    )
    .expect("deposit");
    admin::approve_deposit(conn, &admin(), tx.id, T0).expect("approve");
}

/// Add a GST-free product and return its id.
pub fn product(conn: &mut Connection, name: &str, price: Paise, bv: u64, stk: u64) -> i64 {
    let product = NewProduct {
        name: name.to_string(),
        price,
        gst_bps: 0,
        bv_credits: bv,
        stk_credits: stk,
    };
    admin::add_product(conn, &admin(), &product, T0).expect("add product").id
}

/// Buy one unit at `now` as `user`.
pub fn buy(conn: &mut Connection, user: &User, product_id: i64, now: u64) -> gbnet_engine::PurchaseReceipt {
    gbnet_engine::submit_purchase(
        conn,
        &Session::member(&user.user_code),
        product_id,
        1,
        None,
        now,
        &EngineConfig::default(),
    )
    .expect("purchase")
}
