//! Salary calculation
//!
//! `engine` holds the formulas, `service` feeds them from the database and
//! `config_service` manages the stored configurations.

pub mod config_service;
pub mod engine;
pub mod period;
pub mod rules;
pub mod service;

pub use engine::SalaryReport;
pub use period::SalaryPeriod;
