//! Service entity - the price list of work and equipment
//!
//! Table: crm_service

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Service category, drives the manager's per-category profit percentage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    #[sea_orm(string_value = "conditioner")]
    Conditioner,
    #[sea_orm(string_value = "installation")]
    Installation,
    #[sea_orm(string_value = "dismantling")]
    Dismantling,
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
    #[sea_orm(string_value = "additional")]
    Additional,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Conditioner => "conditioner",
            ServiceCategory::Installation => "installation",
            ServiceCategory::Dismantling => "dismantling",
            ServiceCategory::Maintenance => "maintenance",
            ServiceCategory::Additional => "additional",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceCategory::Conditioner => "Conditioners",
            ServiceCategory::Installation => "Installation",
            ServiceCategory::Dismantling => "Dismantling",
            ServiceCategory::Maintenance => "Maintenance",
            ServiceCategory::Additional => "Additional services",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crm_service")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(100))")]
    pub name: String,

    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub cost_price: Decimal,

    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub selling_price: Decimal,

    pub category: ServiceCategory,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Margin in percent of the selling price, 0 for a free service
    pub fn profit_margin(&self) -> Decimal {
        if self.selling_price.is_zero() {
            return Decimal::ZERO;
        }
        crate::money::round2((self.selling_price - self.cost_price) / self.selling_price * Decimal::ONE_HUNDRED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: &str) -> Decimal {
        v.parse().unwrap()
    }

    fn service(cost: Decimal, sell: Decimal) -> Model {
        Model {
            id: 1,
            name: "Split system".to_string(),
            cost_price: cost,
            selling_price: sell,
            category: ServiceCategory::Conditioner,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_profit_margin() {
        assert_eq!(service(d("600"), d("1000")).profit_margin(), d("40"));
        assert_eq!(service(d("1"), d("3")).profit_margin(), d("66.67"));
        assert_eq!(service(d("10"), d("0")).profit_margin(), Decimal::ZERO);
    }
}
