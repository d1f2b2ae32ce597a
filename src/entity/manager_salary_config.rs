//! Manager salary parameters
//!
//! Table: crm_manager_salary_config

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crm_manager_salary_config")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique)]
    pub config_id: i64,

    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub fixed_salary: Decimal,

    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub bonus_per_completed_order: Decimal,

    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub conditioner_profit_percentage: Decimal,

    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub additional_services_profit_percentage: Decimal,

    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub installation_profit_percentage: Decimal,

    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub maintenance_profit_percentage: Decimal,

    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub dismantling_profit_percentage: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::salary_config::Entity",
        from = "Column::ConfigId",
        to = "super::salary_config::Column::Id",
        on_delete = "Cascade"
    )]
    Config,
}

impl ActiveModelBehavior for ActiveModel {}
