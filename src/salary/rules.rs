//! Salary formula parameters
//!
//! A [`RuleSet`] is either the rates of a stored salary configuration or the
//! fixed legacy formula used when no usable configuration exists.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::entity::service::ServiceCategory;
use crate::entity::{installer_salary_config, manager_salary_config, owner_salary_config};

pub const LEGACY_CONFIG_NAME: &str = "Standard (legacy)";

/// Name of the configuration created by "create default"
pub const DEFAULT_CONFIG_NAME: &str = "Default configuration";
pub const DEFAULT_CONFIG_DESCRIPTION: &str = "Default salary configuration";
/// Case-insensitive marker used to find the fallback configuration
pub const DEFAULT_CONFIG_MARKER: &str = "default";

/// Figures used to estimate staff payouts in the owner's calculation
pub const ESTIMATED_INSTALLER_PAY: i64 = 1500;
pub const ESTIMATED_INSTALLERS_PER_ORDER: i64 = 2;
pub const ESTIMATED_MANAGER_FIXED: i64 = 30000;
pub const ESTIMATED_MANAGER_ORDER_BONUS: i64 = 250;

/// Which formula applies to a calculation
#[derive(Clone, Debug, PartialEq)]
pub enum RuleSet<R> {
    Configured { config_name: String, rates: R },
    Legacy,
}

impl<R> RuleSet<R> {
    pub fn configured(config_name: impl Into<String>, rates: R) -> Self {
        RuleSet::Configured {
            config_name: config_name.into(),
            rates,
        }
    }

    pub fn config_name(&self) -> &str {
        match self {
            RuleSet::Configured { config_name, .. } => config_name,
            RuleSet::Legacy => LEGACY_CONFIG_NAME,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, RuleSet::Legacy)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstallerRates {
    pub payment_per_installation: Decimal,
    pub additional_services_profit_percentage: Decimal,
}

impl InstallerRates {
    pub fn legacy() -> Self {
        Self {
            payment_per_installation: Decimal::from(1500),
            additional_services_profit_percentage: Decimal::from(30),
        }
    }
}

impl Default for InstallerRates {
    fn default() -> Self {
        Self::legacy()
    }
}

impl From<&installer_salary_config::Model> for InstallerRates {
    fn from(m: &installer_salary_config::Model) -> Self {
        Self {
            payment_per_installation: m.payment_per_installation,
            additional_services_profit_percentage: m.additional_services_profit_percentage,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ManagerRates {
    pub fixed_salary: Decimal,
    pub bonus_per_completed_order: Decimal,
    /// Percent of item profit per category; a missing category earns nothing
    pub category_percentages: BTreeMap<ServiceCategory, Decimal>,
}

impl ManagerRates {
    /// Legacy formula: only conditioners and additional services earn a share
    pub fn legacy() -> Self {
        let mut category_percentages = BTreeMap::new();
        category_percentages.insert(ServiceCategory::Conditioner, Decimal::from(20));
        category_percentages.insert(ServiceCategory::Additional, Decimal::from(30));
        Self {
            fixed_salary: Decimal::from(30000),
            bonus_per_completed_order: Decimal::from(250),
            category_percentages,
        }
    }

    pub fn percentage(&self, category: ServiceCategory) -> Option<Decimal> {
        self.category_percentages.get(&category).copied()
    }
}

impl Default for ManagerRates {
    fn default() -> Self {
        let mut rates = Self::legacy();
        rates
            .category_percentages
            .insert(ServiceCategory::Installation, Decimal::from(15));
        rates
            .category_percentages
            .insert(ServiceCategory::Maintenance, Decimal::from(25));
        rates
            .category_percentages
            .insert(ServiceCategory::Dismantling, Decimal::from(20));
        rates
    }
}

impl From<&manager_salary_config::Model> for ManagerRates {
    fn from(m: &manager_salary_config::Model) -> Self {
        let category_percentages = BTreeMap::from([
            (ServiceCategory::Conditioner, m.conditioner_profit_percentage),
            (ServiceCategory::Additional, m.additional_services_profit_percentage),
            (ServiceCategory::Installation, m.installation_profit_percentage),
            (ServiceCategory::Maintenance, m.maintenance_profit_percentage),
            (ServiceCategory::Dismantling, m.dismantling_profit_percentage),
        ]);
        Self {
            fixed_salary: m.fixed_salary,
            bonus_per_completed_order: m.bonus_per_completed_order,
            category_percentages,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OwnerRates {
    pub payment_per_installation: Decimal,
    pub remaining_profit_percentage: Decimal,
}

impl OwnerRates {
    pub fn legacy() -> Self {
        Self {
            payment_per_installation: Decimal::from(1500),
            remaining_profit_percentage: Decimal::ONE_HUNDRED,
        }
    }
}

impl Default for OwnerRates {
    fn default() -> Self {
        Self::legacy()
    }
}

impl From<&owner_salary_config::Model> for OwnerRates {
    fn from(m: &owner_salary_config::Model) -> Self {
        Self {
            payment_per_installation: m.payment_per_installation,
            remaining_profit_percentage: m.remaining_profit_percentage,
        }
    }
}
