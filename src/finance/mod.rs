//! Company finances
//!
//! `ledger` writes transactions (order completion, salary payouts) and
//! `stats` aggregates them for the finance and dashboard endpoints.

pub mod ledger;
pub mod stats;

pub use ledger::company_balance;
