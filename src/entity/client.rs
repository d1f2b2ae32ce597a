//! Client entity - customers of the company
//!
//! Table: crm_client

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Where the client came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
#[serde(rename_all = "snake_case")]
pub enum ClientSource {
    #[sea_orm(string_value = "website")]
    Website,
    #[sea_orm(string_value = "avito")]
    Avito,
    #[sea_orm(string_value = "vk")]
    Vk,
    #[sea_orm(string_value = "recommendations")]
    Recommendations,
    #[sea_orm(string_value = "other")]
    Other,
}

impl ClientSource {
    pub fn display_name(&self) -> &'static str {
        match self {
            ClientSource::Website => "Website",
            ClientSource::Avito => "Avito",
            ClientSource::Vk => "VK",
            ClientSource::Recommendations => "Recommendations",
            ClientSource::Other => "Other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crm_client")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(100))")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub address: String,

    #[sea_orm(column_type = "String(Some(20))")]
    pub phone: String,

    pub source: ClientSource,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
