//! UserSalaryAssignment entity - which config a user is paid by
//!
//! Table: crm_user_salary_assignment. One row per user.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crm_user_salary_assignment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique)]
    pub user_id: i64,

    pub config_id: i64,

    pub assigned_at: DateTimeUtc,
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
        belongs_to = "super::salary_config::Entity",
        from = "Column::ConfigId",
        to = "super::salary_config::Column::Id",
        on_delete = "Cascade"
    )]
    Config,
}

impl ActiveModelBehavior for ActiveModel {}
