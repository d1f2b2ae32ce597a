//! Client handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use super::{paginate, parse_choice, require_text, scope, search_term, Page};
use crate::entity::client::{self, ClientSource};
use crate::error::{AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    pub source: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ClientResponse {
    #[serde(flatten)]
    pub client: client::Model,
    pub source_display: String,
}

impl From<client::Model> for ClientResponse {
    fn from(client: client::Model) -> Self {
        Self {
            source_display: client.source.display_name().to_string(),
            client,
        }
    }
}

struct ValidClient {
    name: String,
    address: String,
    phone: String,
    source: ClientSource,
}

impl ClientRequest {
    fn validate(&self) -> AppResult<ValidClient> {
        Ok(ValidClient {
            name: require_text("name", &self.name, 100)?,
            address: require_text("address", &self.address, 1000)?,
            phone: require_text("phone", &self.phone, 20)?,
            source: parse_choice("source", &self.source)?,
        })
    }
}

async fn find_client(db: &DbConn, user: &CurrentUser, id: i64) -> AppResult<client::Model> {
    client::Entity::find_by_id(id)
        .filter(scope::clients(&**db, user).await?)
        .one(&**db)
        .await?
        .ok_or_not_found("client not found")
}

/// GET /api/clients
pub async fn list_clients(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ClientQuery>,
) -> AppResult<Json<ApiResponse<Page<ClientResponse>>>> {
    state.perm.require(&user, res::CLIENTS, action::READ).await?;

    let mut select = client::Entity::find().filter(scope::clients(&*db, &user).await?);
    if let Some(source) = query.source.as_deref().filter(|s| !s.is_empty()) {
        let source: ClientSource = parse_choice("source", source)?;
        select = select.filter(client::Column::Source.eq(source));
    }
    if let Some(term) = search_term(query.search.as_deref()) {
        select = select.filter(
            Condition::any()
                .add(client::Column::Name.contains(term))
                .add(client::Column::Phone.contains(term))
                .add(client::Column::Address.contains(term)),
        );
    }
    let select = select
        .order_by_desc(client::Column::CreatedAt)
        .order_by_desc(client::Column::Id);

    let page = paginate(&db, select, query.page, query.page_size).await?;
    Ok(Json(ApiResponse::success(page.map(ClientResponse::from))))
}

/// GET /api/clients/:id
pub async fn get_client(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<ClientResponse>>> {
    state.perm.require(&user, res::CLIENTS, action::READ).await?;
    let found = find_client(&db, &user, id).await?;
    Ok(Json(ApiResponse::success(ClientResponse::from(found))))
}

/// POST /api/clients
pub async fn create_client(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<ClientRequest>,
) -> AppResult<Json<ApiResponse<ClientResponse>>> {
    state.perm.require(&user, res::CLIENTS, action::WRITE).await?;
    let valid = req.validate()?;

    let created = client::ActiveModel {
        name: Set(valid.name),
        address: Set(valid.address),
        phone: Set(valid.phone),
        source: Set(valid.source),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    tracing::info!("Client created: {} (id {}) by {}", created.name, created.id, user.username);
    Ok(Json(ApiResponse::success(ClientResponse::from(created))))
}

/// PUT /api/clients/:id
pub async fn update_client(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<ClientRequest>,
) -> AppResult<Json<ApiResponse<ClientResponse>>> {
    state.perm.require(&user, res::CLIENTS, action::WRITE).await?;
    let valid = req.validate()?;
    let existing = find_client(&db, &user, id).await?;

    let mut active: client::ActiveModel = existing.into();
    active.name = Set(valid.name);
    active.address = Set(valid.address);
    active.phone = Set(valid.phone);
    active.source = Set(valid.source);
    let updated = active.update(&*db).await?;

    tracing::info!("Client updated: {} by {}", updated.id, user.username);
    Ok(Json(ApiResponse::success(ClientResponse::from(updated))))
}

/// DELETE /api/clients/:id
pub async fn delete_client(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.perm.require(&user, res::CLIENTS, action::WRITE).await?;
    let existing = find_client(&db, &user, id).await?;
    client::Entity::delete_by_id(existing.id).exec(&*db).await?;

    tracing::info!("Client deleted: {} (id {}) by {}", existing.name, id, user.username);
    Ok(Json(ApiResponse::success_msg("client deleted")))
}
