//! Query functions, one module per table group.

pub mod bv;
pub mod commerce;
pub mod commissions;
pub mod salary;
pub mod settings;
pub mod stk;
pub mod users;
pub mod wallet;
