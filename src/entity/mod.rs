//! Entity module - SeaORM entity definitions
//!
//! One module per database table

pub mod client;
pub mod installer_salary_config;
pub mod manager_salary_config;
pub mod order;
pub mod order_installer;
pub mod order_item;
pub mod owner_salary_config;
pub mod salary_adjustment;
pub mod salary_config;
pub mod salary_payment;
pub mod service;
pub mod transaction;
pub mod user;
pub mod user_salary_assignment;
