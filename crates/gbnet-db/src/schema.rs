//! SQL schema definitions.

/// Complete schema for GBNet v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Members & placement
-- ============================================================

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    sponsor_code TEXT REFERENCES users(user_code),
    side TEXT CHECK (side IN ('left', 'right')),
    referral_code TEXT NOT NULL UNIQUE,
    kyc_status TEXT NOT NULL DEFAULT 'not_submitted',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    placed_at INTEGER,
    CHECK ((sponsor_code IS NULL) = (side IS NULL))
);

-- Binary constraint: one child per (sponsor, side).
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_slot
    ON users(sponsor_code, side) WHERE sponsor_code IS NOT NULL;

-- ============================================================
-- Wallets & audit trail
-- ============================================================

CREATE TABLE IF NOT EXISTS wallets (
    user_code TEXT PRIMARY KEY REFERENCES users(user_code),
    main_balance INTEGER NOT NULL DEFAULT 0 CHECK (main_balance >= 0),
    topup_balance INTEGER NOT NULL DEFAULT 0 CHECK (topup_balance >= 0),
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_code TEXT NOT NULL REFERENCES users(user_code),
    tx_type TEXT NOT NULL,
    bucket TEXT NOT NULL CHECK (bucket IN ('main', 'topup')),
    amount INTEGER NOT NULL,
    gross_amount INTEGER NOT NULL DEFAULT 0,
    fee_amount INTEGER NOT NULL DEFAULT 0,
    tds_amount INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    balance_before INTEGER NOT NULL,
    balance_after INTEGER NOT NULL,
    request_key TEXT,
    counterparty_code TEXT,
    reference_id INTEGER REFERENCES transactions(id),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tx_request_key
    ON transactions(request_key) WHERE request_key IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_tx_user ON transactions(user_code, created_at);

-- Transfer tax and withdrawal fees: audited, never a user balance.
CREATE TABLE IF NOT EXISTS platform_fees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_tx_id INTEGER NOT NULL REFERENCES transactions(id),
    fee_type TEXT NOT NULL,
    amount INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

-- ============================================================
-- Business volume & commissions
-- ============================================================

CREATE TABLE IF NOT EXISTS business_volume (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_code TEXT NOT NULL REFERENCES users(user_code),
    source_user_code TEXT NOT NULL REFERENCES users(user_code),
    purchase_id TEXT NOT NULL,
    level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 10),
    amount INTEGER NOT NULL CHECK (amount >= 0),
    created_at INTEGER NOT NULL,
    expiry_date INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'expired')),
    UNIQUE (purchase_id, level)
);

CREATE INDEX IF NOT EXISTS idx_bv_user_status ON business_volume(user_code, status);
CREATE INDEX IF NOT EXISTS idx_bv_expiry
    ON business_volume(expiry_date) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS commissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bv_entry_id INTEGER NOT NULL UNIQUE REFERENCES business_volume(id),
    user_code TEXT NOT NULL REFERENCES users(user_code),
    level INTEGER NOT NULL,
    bv_amount INTEGER NOT NULL,
    percentage_bps INTEGER NOT NULL,
    required_directs INTEGER NOT NULL,
    directs_at_payout INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('paid', 'unqualified')),
    wallet_tx_id INTEGER REFERENCES transactions(id),
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_commissions_user ON commissions(user_code);

CREATE TABLE IF NOT EXISTS salary_payouts (
    user_code TEXT NOT NULL REFERENCES users(user_code),
    period TEXT NOT NULL,
    slab_level INTEGER NOT NULL,
    balanced_bv INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    wallet_tx_id INTEGER REFERENCES transactions(id),
    paid_at INTEGER NOT NULL,
    PRIMARY KEY (user_code, period)
);

-- ============================================================
-- STK token ledger
-- ============================================================

CREATE TABLE IF NOT EXISTS stk_wallets (
    user_code TEXT PRIMARY KEY REFERENCES users(user_code),
    locked_balance INTEGER NOT NULL DEFAULT 0 CHECK (locked_balance >= 0),
    unlocked_balance INTEGER NOT NULL DEFAULT 0 CHECK (unlocked_balance >= 0),
    total_balance INTEGER GENERATED ALWAYS AS (locked_balance + unlocked_balance) VIRTUAL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS stk_transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_code TEXT NOT NULL REFERENCES users(user_code),
    tx_type TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    lot_status TEXT NOT NULL CHECK (lot_status IN ('none', 'locked', 'unlocked')),
    unlock_at INTEGER,
    unlocked_at INTEGER,
    description TEXT NOT NULL DEFAULT '',
    request_key TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stk_due
    ON stk_transactions(unlock_at) WHERE lot_status = 'locked';
CREATE INDEX IF NOT EXISTS idx_stk_user ON stk_transactions(user_code);
CREATE UNIQUE INDEX IF NOT EXISTS idx_stk_request_key
    ON stk_transactions(request_key) WHERE request_key IS NOT NULL;

-- ============================================================
-- Commerce
-- ============================================================

CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    price INTEGER NOT NULL CHECK (price > 0),
    gst_bps INTEGER NOT NULL DEFAULT 0,
    bv_credits INTEGER NOT NULL DEFAULT 0,
    stk_credits INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_code TEXT NOT NULL REFERENCES users(user_code),
    product_id INTEGER NOT NULL REFERENCES products(id),
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    amount INTEGER NOT NULL,
    bv_credited INTEGER NOT NULL,
    stk_credited INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    request_key TEXT,
    created_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_request_key
    ON orders(request_key) WHERE request_key IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_code, status);

-- ============================================================
-- Settings & misc
-- ============================================================

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
