//! User entity - employees of the company
//!
//! Table: crm_user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Employee role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[sea_orm(string_value = "owner")]
    Owner,
    #[sea_orm(string_value = "manager")]
    Manager,
    #[sea_orm(string_value = "installer")]
    Installer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Installer => "installer",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::Manager => "Manager",
            Role::Installer => "Installer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Role::Owner),
            "manager" => Some(Role::Manager),
            "installer" => Some(Role::Installer),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crm_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Login name (unique)
    #[sea_orm(column_type = "String(Some(150))", unique)]
    pub username: String,

    /// bcrypt hash
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    #[sea_orm(column_type = "String(Some(150))")]
    pub first_name: String,

    #[sea_orm(column_type = "String(Some(150))")]
    pub last_name: String,

    #[sea_orm(column_type = "String(Some(254))", nullable)]
    pub email: Option<String>,

    #[sea_orm(column_type = "String(Some(20))", nullable)]
    pub phone: Option<String>,

    pub role: Role,

    pub is_active: bool,

    pub last_login: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// "First Last", falling back to the username when both names are empty
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// User response (without password)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub role_display: String,
    pub is_active: bool,
    pub last_login: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

impl From<Model> for UserResponse {
    fn from(model: Model) -> Self {
        Self {
            full_name: model.full_name(),
            role_display: model.role.display_name().to_string(),
            id: model.id,
            username: model.username,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            phone: model.phone,
            role: model.role,
            is_active: model.is_active,
            last_login: model.last_login,
            created_at: model.created_at,
        }
    }
}
