//! HVAC CRM - client, order and payroll management for an HVAC installation company
//!
//! Owners, managers and installers share one API. Orders drive the ledger
//! and the salary engine computes pay per role from stored configurations.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod finance;
pub mod handlers;
pub mod middleware;
pub mod money;
pub mod permission;
pub mod routes;
pub mod salary;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
