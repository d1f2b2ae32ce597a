//! Salary formulas
//!
//! Pure functions over already loaded order data. The database side lives
//! in [`super::service`]; everything here is deterministic and rounds money
//! to cents only when building the report.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::period::SalaryPeriod;
use super::rules::{
    InstallerRates, ManagerRates, OwnerRates, RuleSet, ESTIMATED_INSTALLERS_PER_ORDER,
    ESTIMATED_INSTALLER_PAY, ESTIMATED_MANAGER_FIXED, ESTIMATED_MANAGER_ORDER_BONUS,
};
use crate::entity::salary_adjustment::{self, AdjustmentType};
use crate::entity::service::ServiceCategory;
use crate::entity::user::Role;
use crate::money::{percent_of, round2};

/// An order item of a completed order, joined with its service
#[derive(Clone, Debug, PartialEq)]
pub struct SoldItem {
    pub order_id: i64,
    pub seller_id: i64,
    pub category: ServiceCategory,
    pub price: Decimal,
    pub cost_price: Decimal,
}

impl SoldItem {
    pub fn profit(&self) -> Decimal {
        self.price - self.cost_price
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AdjustmentLine {
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    pub type_display: String,
    pub amount: Decimal,
    pub reason: String,
}

impl From<&salary_adjustment::Model> for AdjustmentLine {
    fn from(m: &salary_adjustment::Model) -> Self {
        Self {
            kind: m.adjustment_type,
            type_display: m.adjustment_type.display_name().to_string(),
            amount: m.amount,
            reason: m.reason.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstallerSalary {
    pub config_name: String,
    pub period: String,
    pub installation_pay: Decimal,
    pub installation_count: u64,
    pub additional_pay: Decimal,
    pub additional_services_count: u64,
    pub adjustments: Decimal,
    pub adjustments_details: Vec<AdjustmentLine>,
    pub total_salary: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CategorySales {
    pub count: u64,
    pub profit: Decimal,
    pub bonus: Decimal,
    pub percentage: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ManagerSalary {
    pub config_name: String,
    pub period: String,
    pub fixed_salary: Decimal,
    pub orders_bonus: Decimal,
    pub completed_orders_count: u64,
    pub sales_bonus: Decimal,
    pub sales_details: BTreeMap<ServiceCategory, CategorySales>,
    pub adjustments: Decimal,
    pub adjustments_details: Vec<AdjustmentLine>,
    pub total_salary: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OwnerSalary {
    pub config_name: String,
    pub period: String,
    pub installation_pay: Decimal,
    pub completed_orders_count: u64,
    pub total_revenue: Decimal,
    pub total_cost_price: Decimal,
    pub gross_profit: Decimal,
    pub estimated_staff_payments: Decimal,
    pub remaining_profit: Decimal,
    pub owner_profit_share: Decimal,
    pub adjustments: Decimal,
    pub adjustments_details: Vec<AdjustmentLine>,
    pub total_salary: Decimal,
}

/// A salary calculation for one employee
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum SalaryReport {
    Installer(InstallerSalary),
    Manager(ManagerSalary),
    Owner(OwnerSalary),
}

impl SalaryReport {
    pub fn role(&self) -> Role {
        match self {
            SalaryReport::Installer(_) => Role::Installer,
            SalaryReport::Manager(_) => Role::Manager,
            SalaryReport::Owner(_) => Role::Owner,
        }
    }

    pub fn total_salary(&self) -> Decimal {
        match self {
            SalaryReport::Installer(s) => s.total_salary,
            SalaryReport::Manager(s) => s.total_salary,
            SalaryReport::Owner(s) => s.total_salary,
        }
    }

    pub fn config_name(&self) -> &str {
        match self {
            SalaryReport::Installer(s) => &s.config_name,
            SalaryReport::Manager(s) => &s.config_name,
            SalaryReport::Owner(s) => &s.config_name,
        }
    }
}

/// Legacy calculations ignore adjustments entirely
fn applied_adjustments<R>(
    rules: &RuleSet<R>,
    adjustments: &[AdjustmentLine],
) -> (Decimal, Vec<AdjustmentLine>) {
    if rules.is_legacy() {
        return (Decimal::ZERO, Vec::new());
    }
    let total = adjustments.iter().map(|a| a.amount).sum();
    let details = adjustments
        .iter()
        .map(|a| AdjustmentLine {
            amount: round2(a.amount),
            ..a.clone()
        })
        .collect();
    (total, details)
}

/// Installer pay: a flat rate per completed installation plus a share of the
/// profit on additional services the installer sold themselves.
///
/// `items` are the items of the completed orders the installer worked on.
pub fn installer_salary(
    rules: &RuleSet<InstallerRates>,
    installer_id: i64,
    completed_orders: u64,
    items: &[SoldItem],
    adjustments: &[AdjustmentLine],
    period: &SalaryPeriod,
) -> InstallerSalary {
    let legacy = InstallerRates::legacy();
    let rates = match rules {
        RuleSet::Configured { rates, .. } => rates,
        RuleSet::Legacy => &legacy,
    };

    let installation_pay = rates.payment_per_installation * Decimal::from(completed_orders);

    let own_additional: Vec<&SoldItem> = items
        .iter()
        .filter(|i| i.category == ServiceCategory::Additional && i.seller_id == installer_id)
        .collect();
    let additional_pay: Decimal = own_additional
        .iter()
        .map(|i| percent_of(i.profit(), rates.additional_services_profit_percentage))
        .sum();

    let (adjustments, adjustments_details) = applied_adjustments(rules, adjustments);
    let total = installation_pay + additional_pay + adjustments;

    InstallerSalary {
        config_name: rules.config_name().to_string(),
        period: period.label(),
        installation_pay: round2(installation_pay),
        installation_count: completed_orders,
        additional_pay: round2(additional_pay),
        additional_services_count: own_additional.len() as u64,
        adjustments: round2(adjustments),
        adjustments_details,
        total_salary: round2(total),
    }
}

/// Manager pay: fixed salary, a bonus per completed order and a
/// per-category share of the profit on items the manager sold.
///
/// `items` are the items of the completed orders the manager is responsible for.
pub fn manager_salary(
    rules: &RuleSet<ManagerRates>,
    manager_id: i64,
    completed_orders: u64,
    items: &[SoldItem],
    adjustments: &[AdjustmentLine],
    period: &SalaryPeriod,
) -> ManagerSalary {
    let legacy = ManagerRates::legacy();
    let rates = match rules {
        RuleSet::Configured { rates, .. } => rates,
        RuleSet::Legacy => &legacy,
    };

    let mut sales_details: BTreeMap<ServiceCategory, CategorySales> = BTreeMap::new();
    if rules.is_legacy() {
        for (category, percentage) in &rates.category_percentages {
            sales_details.insert(
                *category,
                CategorySales {
                    percentage: *percentage,
                    ..CategorySales::default()
                },
            );
        }
    }

    let mut sales_bonus = Decimal::ZERO;
    for item in items.iter().filter(|i| i.seller_id == manager_id) {
        let percentage = match rates.percentage(item.category) {
            Some(p) => p,
            None if rules.is_legacy() => continue,
            None => Decimal::ZERO,
        };
        let profit = item.profit();
        let bonus = percent_of(profit, percentage);
        sales_bonus += bonus;

        let entry = sales_details.entry(item.category).or_insert_with(|| CategorySales {
            percentage,
            ..CategorySales::default()
        });
        entry.count += 1;
        entry.profit += profit;
        entry.bonus += bonus;
    }
    for entry in sales_details.values_mut() {
        entry.profit = round2(entry.profit);
        entry.bonus = round2(entry.bonus);
    }

    let orders_bonus = rates.bonus_per_completed_order * Decimal::from(completed_orders);
    let (adjustments, adjustments_details) = applied_adjustments(rules, adjustments);
    let total = rates.fixed_salary + orders_bonus + sales_bonus + adjustments;

    ManagerSalary {
        config_name: rules.config_name().to_string(),
        period: period.label(),
        fixed_salary: round2(rates.fixed_salary),
        orders_bonus: round2(orders_bonus),
        completed_orders_count: completed_orders,
        sales_bonus: round2(sales_bonus),
        sales_details,
        adjustments: round2(adjustments),
        adjustments_details,
        total_salary: round2(total),
    }
}

/// Rough staff payout for `orders` completed orders, used by the owner formula
pub fn estimated_staff_payments(orders: u64, managers_count: u64) -> Decimal {
    let orders = Decimal::from(orders);
    let installers = orders
        * Decimal::from(ESTIMATED_INSTALLER_PAY)
        * Decimal::from(ESTIMATED_INSTALLERS_PER_ORDER);
    let managers = Decimal::from(managers_count) * Decimal::from(ESTIMATED_MANAGER_FIXED)
        + orders * Decimal::from(ESTIMATED_MANAGER_ORDER_BONUS);
    installers + managers
}

/// Owner pay: a rate per completed installation plus a share of what is left
/// of the gross profit once estimated staff payouts are taken out.
///
/// `items` are the items of every completed order in the period.
pub fn owner_salary(
    rules: &RuleSet<OwnerRates>,
    completed_orders: u64,
    items: &[SoldItem],
    managers_count: u64,
    adjustments: &[AdjustmentLine],
    period: &SalaryPeriod,
) -> OwnerSalary {
    let total_revenue: Decimal = items.iter().map(|i| i.price).sum();
    let total_cost_price: Decimal = items.iter().map(|i| i.cost_price).sum();
    let gross_profit = total_revenue - total_cost_price;

    let (installation_pay, estimated_staff, remaining_profit, owner_profit_share) = match rules {
        RuleSet::Configured { rates, .. } => {
            let installation_pay = rates.payment_per_installation * Decimal::from(completed_orders);
            let staff = estimated_staff_payments(completed_orders, managers_count);
            let remaining = gross_profit - staff - installation_pay;
            let share = percent_of(remaining, rates.remaining_profit_percentage);
            (installation_pay, staff, remaining, share)
        }
        RuleSet::Legacy => {
            // One manager is assumed and the owner's own installation pay is not deducted
            let rates = OwnerRates::legacy();
            let installation_pay = rates.payment_per_installation * Decimal::from(completed_orders);
            let staff = estimated_staff_payments(completed_orders, 1);
            let remaining = gross_profit - staff;
            (installation_pay, staff, remaining, remaining)
        }
    };

    let (adjustments, adjustments_details) = applied_adjustments(rules, adjustments);
    let total = installation_pay + owner_profit_share + adjustments;

    OwnerSalary {
        config_name: rules.config_name().to_string(),
        period: period.label(),
        installation_pay: round2(installation_pay),
        completed_orders_count: completed_orders,
        total_revenue: round2(total_revenue),
        total_cost_price: round2(total_cost_price),
        gross_profit: round2(gross_profit),
        estimated_staff_payments: round2(estimated_staff),
        remaining_profit: round2(remaining_profit),
        owner_profit_share: round2(owner_profit_share),
        adjustments: round2(adjustments),
        adjustments_details,
        total_salary: round2(total),
    }
}
