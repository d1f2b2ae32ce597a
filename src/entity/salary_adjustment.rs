//! SalaryAdjustment entity - signed bonus, penalty or correction over a period
//!
//! Table: crm_salary_adjustment

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    #[sea_orm(string_value = "bonus")]
    Bonus,
    #[sea_orm(string_value = "penalty")]
    Penalty,
    #[sea_orm(string_value = "correction")]
    Correction,
}

impl AdjustmentType {
    pub fn display_name(&self) -> &'static str {
        match self {
            AdjustmentType::Bonus => "Bonus",
            AdjustmentType::Penalty => "Penalty",
            AdjustmentType::Correction => "Correction",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crm_salary_adjustment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub user_id: i64,

    pub adjustment_type: AdjustmentType,

    /// Positive for a bonus, negative for a penalty
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub amount: Decimal,

    #[sea_orm(column_type = "Text")]
    pub reason: String,

    pub period_start: Date,

    pub period_end: Date,

    pub created_by: i64,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Creator,
}

impl ActiveModelBehavior for ActiveModel {}
