//! Service catalogue handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use super::{paginate, parse_choice, require_text, search_term, Page};
use crate::entity::service::{self, ServiceCategory};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ServiceQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
    pub name: String,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    #[serde(flatten)]
    pub service: service::Model,
    pub category_display: String,
    pub profit_margin: Decimal,
}

impl From<service::Model> for ServiceResponse {
    fn from(service: service::Model) -> Self {
        Self {
            category_display: service.category.display_name().to_string(),
            profit_margin: service.profit_margin(),
            service,
        }
    }
}

impl ServiceRequest {
    fn validate(&self) -> AppResult<(String, ServiceCategory)> {
        let name = require_text("name", &self.name, 100)?;
        if self.cost_price < Decimal::ZERO || self.selling_price < Decimal::ZERO {
            return Err(AppError::Validation("prices must not be negative".to_string()));
        }
        Ok((name, parse_choice("category", &self.category)?))
    }
}

async fn find_service(db: &DbConn, id: i64) -> AppResult<service::Model> {
    service::Entity::find_by_id(id)
        .one(&**db)
        .await?
        .ok_or_not_found("service not found")
}

/// GET /api/services
pub async fn list_services(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ServiceQuery>,
) -> AppResult<Json<ApiResponse<Page<ServiceResponse>>>> {
    state.perm.require(&user, res::SERVICES, action::READ).await?;

    let mut select = service::Entity::find();
    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        let category: ServiceCategory = parse_choice("category", category)?;
        select = select.filter(service::Column::Category.eq(category));
    }
    if let Some(term) = search_term(query.search.as_deref()) {
        select = select.filter(service::Column::Name.contains(term));
    }
    let select = select
        .order_by_asc(service::Column::Category)
        .order_by_asc(service::Column::Name);

    let page = paginate(&db, select, query.page, query.page_size).await?;
    Ok(Json(ApiResponse::success(page.map(ServiceResponse::from))))
}

/// GET /api/services/:id
pub async fn get_service(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<ServiceResponse>>> {
    state.perm.require(&user, res::SERVICES, action::READ).await?;
    let found = find_service(&db, id).await?;
    Ok(Json(ApiResponse::success(ServiceResponse::from(found))))
}

/// POST /api/services
pub async fn create_service(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<ServiceRequest>,
) -> AppResult<Json<ApiResponse<ServiceResponse>>> {
    state.perm.require(&user, res::SERVICES, action::WRITE).await?;
    let (name, category) = req.validate()?;

    let created = service::ActiveModel {
        name: Set(name),
        cost_price: Set(req.cost_price),
        selling_price: Set(req.selling_price),
        category: Set(category),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    tracing::info!("Service created: {} (id {})", created.name, created.id);
    Ok(Json(ApiResponse::success(ServiceResponse::from(created))))
}

/// PUT /api/services/:id
pub async fn update_service(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<ServiceRequest>,
) -> AppResult<Json<ApiResponse<ServiceResponse>>> {
    state.perm.require(&user, res::SERVICES, action::WRITE).await?;
    let (name, category) = req.validate()?;
    let existing = find_service(&db, id).await?;

    let mut active: service::ActiveModel = existing.into();
    active.name = Set(name);
    active.cost_price = Set(req.cost_price);
    active.selling_price = Set(req.selling_price);
    active.category = Set(category);
    let updated = active.update(&*db).await?;

    tracing::info!("Service updated: {} (id {})", updated.name, updated.id);
    Ok(Json(ApiResponse::success(ServiceResponse::from(updated))))
}

/// DELETE /api/services/:id
pub async fn delete_service(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.perm.require(&user, res::SERVICES, action::WRITE).await?;
    let existing = find_service(&db, id).await?;
    service::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!("Service deleted: {} (id {})", existing.name, id);
    Ok(Json(ApiResponse::success_msg("service deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::entity::user::Role;
    use crate::handlers::test_support::{as_user, conn, state};
    use crate::salary::service::tests::{d, make_user};

    fn body(category: &str, cost: &str, sell: &str) -> Json<ServiceRequest> {
        Json(ServiceRequest {
            name: "Split system 09".to_string(),
            cost_price: d(cost),
            selling_price: d(sell),
            category: category.to_string(),
        })
    }

    #[tokio::test]
    async fn test_owner_creates_service_with_margin() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;

        let Json(resp) = create_service(state(&db).await, conn(&db), as_user(&owner), body("conditioner", "30000", "40000"))
            .await
            .unwrap();
        let created = resp.data.unwrap();
        assert_eq!(created.profit_margin, d("25"));
        assert_eq!(created.category_display, "Conditioners");
    }

    #[tokio::test]
    async fn test_manager_cannot_write_services() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;

        let err = create_service(state(&db).await, conn(&db), as_user(&manager), body("additional", "1", "2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_negative_price_is_rejected() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;

        let err = create_service(state(&db).await, conn(&db), as_user(&owner), body("additional", "-1", "2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_category_filter() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        for category in ["conditioner", "additional", "additional"] {
            create_service(state(&db).await, conn(&db), as_user(&owner), body(category, "1", "2"))
                .await
                .unwrap();
        }

        let query = ServiceQuery {
            category: Some("additional".to_string()),
            ..ServiceQuery::default()
        };
        let Json(resp) = list_services(state(&db).await, conn(&db), as_user(&owner), Query(query))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().total, 2);
    }
}
