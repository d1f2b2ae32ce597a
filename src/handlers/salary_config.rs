//! Salary configuration handlers
//!
//! Configs, user assignments and adjustments. Owner only.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{parse_choice, require_text};
use crate::entity::salary_adjustment::{self, AdjustmentType};
use crate::entity::{salary_config, user, user_salary_assignment};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::salary::config_service::{self, ConfigDetail, ConfigParams, CopyRequest};
use crate::salary::period::parse_date;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DefaultConfigRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssignmentRequest {
    pub user_id: i64,
    pub config_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssignmentRequest {
    pub config_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BulkAssignRequest {
    pub config_id: i64,
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    #[serde(flatten)]
    pub assignment: user_salary_assignment::Model,
    pub user_name: String,
    pub config_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdjustmentQuery {
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentRequest {
    pub user_id: i64,
    pub adjustment_type: String,
    pub amount: Decimal,
    pub reason: String,
    pub period_start: String,
    pub period_end: String,
}

#[derive(Debug, Serialize)]
pub struct AdjustmentResponse {
    #[serde(flatten)]
    pub adjustment: salary_adjustment::Model,
    pub type_display: String,
    pub user_name: String,
}

async fn require_read(state: &AppState, user: &CurrentUser) -> AppResult<()> {
    state.perm.require(user, res::SALARY_CONFIGS, action::READ).await
}

async fn require_write(state: &AppState, user: &CurrentUser) -> AppResult<()> {
    state.perm.require(user, res::SALARY_CONFIGS, action::WRITE).await
}

async fn user_names(db: &DbConn) -> AppResult<HashMap<i64, String>> {
    Ok(user::Entity::find()
        .all(&**db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.full_name()))
        .collect())
}

// ---- configs ----

/// GET /api/salary-configs
pub async fn list_configs(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<ConfigDetail>>>> {
    require_read(&state, &user).await?;

    let mut details = Vec::new();
    for config in config_service::list_configs(&*db).await? {
        details.push(config_service::config_detail(&*db, config).await?);
    }
    Ok(Json(ApiResponse::success(details)))
}

/// GET /api/salary-configs/:id
pub async fn get_config(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<ConfigDetail>>> {
    require_read(&state, &user).await?;
    let config = config_service::get_config(&*db, id).await?;
    Ok(Json(ApiResponse::success(config_service::config_detail(&*db, config).await?)))
}

/// POST /api/salary-configs
pub async fn create_config(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(params): Json<ConfigParams>,
) -> AppResult<Json<ApiResponse<ConfigDetail>>> {
    require_write(&state, &user).await?;
    let config = config_service::create_config(&db, &params).await?;
    Ok(Json(ApiResponse::success(config_service::config_detail(&*db, config).await?)))
}

/// PUT /api/salary-configs/:id
pub async fn update_config(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(params): Json<ConfigParams>,
) -> AppResult<Json<ApiResponse<ConfigDetail>>> {
    require_write(&state, &user).await?;
    let config = config_service::update_config(&db, id, &params).await?;
    tracing::info!("Salary config {} updated by {}", id, user.username);
    Ok(Json(ApiResponse::success(config_service::config_detail(&*db, config).await?)))
}

/// DELETE /api/salary-configs/:id
pub async fn delete_config(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    require_write(&state, &user).await?;
    config_service::delete_config(&db, id).await?;
    Ok(Json(ApiResponse::success_msg("salary config deleted")))
}

/// POST /api/salary-configs/:id/activate
pub async fn activate_config(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<salary_config::Model>>> {
    require_write(&state, &user).await?;
    Ok(Json(ApiResponse::success(config_service::activate(&db, id).await?)))
}

/// POST /api/salary-configs/:id/copy
pub async fn copy_config(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<CopyRequest>,
) -> AppResult<Json<ApiResponse<ConfigDetail>>> {
    require_write(&state, &user).await?;
    let copy = config_service::copy_config(&db, id, &req).await?;
    Ok(Json(ApiResponse::success(config_service::config_detail(&*db, copy).await?)))
}

/// POST /api/salary-configs/default
pub async fn create_default_config(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<DefaultConfigRequest>,
) -> AppResult<Json<ApiResponse<ConfigDetail>>> {
    require_write(&state, &user).await?;

    let active = salary_config::Entity::find()
        .filter(salary_config::Column::IsActive.eq(true))
        .count(&*db)
        .await?;
    if active > 0 && !req.force {
        return Err(AppError::Conflict(
            "an active salary config already exists, pass force to create another".to_string(),
        ));
    }

    let config = config_service::create_default_config(&db).await?;
    Ok(Json(ApiResponse::success(config_service::config_detail(&*db, config).await?)))
}

// ---- assignments ----

/// GET /api/salary-assignments
pub async fn list_assignments(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<AssignmentResponse>>>> {
    require_read(&state, &user).await?;

    let names = user_names(&db).await?;
    let configs: HashMap<i64, String> = config_service::list_configs(&*db)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let rows = user_salary_assignment::Entity::find()
        .order_by_desc(user_salary_assignment::Column::AssignedAt)
        .all(&*db)
        .await?;

    let results = rows
        .into_iter()
        .map(|assignment| AssignmentResponse {
            user_name: names.get(&assignment.user_id).cloned().unwrap_or_default(),
            config_name: configs.get(&assignment.config_id).cloned().unwrap_or_default(),
            assignment,
        })
        .collect();
    Ok(Json(ApiResponse::success(results)))
}

/// POST /api/salary-assignments
pub async fn create_assignment(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<AssignmentRequest>,
) -> AppResult<Json<ApiResponse<user_salary_assignment::Model>>> {
    require_write(&state, &user).await?;
    let assignment = config_service::assign_checked(&*db, req.user_id, req.config_id).await?;
    tracing::info!("Config {} assigned to user {}", req.config_id, req.user_id);
    Ok(Json(ApiResponse::success(assignment)))
}

/// PUT /api/salary-assignments/:id
pub async fn update_assignment(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAssignmentRequest>,
) -> AppResult<Json<ApiResponse<user_salary_assignment::Model>>> {
    require_write(&state, &user).await?;
    let existing = user_salary_assignment::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("assignment not found")?;
    let assignment = config_service::assign_checked(&*db, existing.user_id, req.config_id).await?;
    Ok(Json(ApiResponse::success(assignment)))
}

/// DELETE /api/salary-assignments/:id
pub async fn delete_assignment(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    require_write(&state, &user).await?;
    user_salary_assignment::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("assignment not found")?;
    user_salary_assignment::Entity::delete_by_id(id).exec(&*db).await?;
    Ok(Json(ApiResponse::success_msg("assignment deleted")))
}

/// POST /api/salary-assignments/bulk
pub async fn bulk_assign(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<BulkAssignRequest>,
) -> AppResult<Json<ApiResponse<CountResponse>>> {
    require_write(&state, &user).await?;
    let count = config_service::bulk_assign(&db, req.config_id, &req.user_ids).await?;
    tracing::info!("Config {} assigned to {} users by {}", req.config_id, count, user.username);
    Ok(Json(ApiResponse::success(CountResponse { count })))
}

/// POST /api/salary-assignments/auto
pub async fn auto_assign(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<CountResponse>>> {
    require_write(&state, &user).await?;
    let count = config_service::bulk_assign_default_config(&db).await?;
    Ok(Json(ApiResponse::success(CountResponse { count })))
}

// ---- adjustments ----

struct ValidAdjustment {
    kind: AdjustmentType,
    reason: String,
    period_start: chrono::NaiveDate,
    period_end: chrono::NaiveDate,
}

impl AdjustmentRequest {
    fn validate(&self) -> AppResult<ValidAdjustment> {
        let kind = parse_choice("adjustment_type", &self.adjustment_type)?;
        let reason = require_text("reason", &self.reason, 1000)?;
        let period_start = parse_date(&self.period_start)?;
        let period_end = parse_date(&self.period_end)?;
        if period_start > period_end {
            return Err(AppError::Validation(
                "period_start must not be after period_end".to_string(),
            ));
        }
        Ok(ValidAdjustment {
            kind,
            reason,
            period_start,
            period_end,
        })
    }
}

async fn check_user_exists(db: &DbConn, id: i64) -> AppResult<()> {
    user::Entity::find_by_id(id)
        .one(&**db)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::Validation(format!("user {} does not exist", id)))
}

fn adjustment_response(adjustment: salary_adjustment::Model, names: &HashMap<i64, String>) -> AdjustmentResponse {
    AdjustmentResponse {
        type_display: adjustment.adjustment_type.display_name().to_string(),
        user_name: names.get(&adjustment.user_id).cloned().unwrap_or_default(),
        adjustment,
    }
}

/// GET /api/salary-adjustments
pub async fn list_adjustments(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<AdjustmentQuery>,
) -> AppResult<Json<ApiResponse<Vec<AdjustmentResponse>>>> {
    require_read(&state, &user).await?;

    let mut select = salary_adjustment::Entity::find();
    if let Some(user_id) = query.user_id {
        select = select.filter(salary_adjustment::Column::UserId.eq(user_id));
    }
    let rows = select
        .order_by_desc(salary_adjustment::Column::CreatedAt)
        .order_by_desc(salary_adjustment::Column::Id)
        .all(&*db)
        .await?;

    let names = user_names(&db).await?;
    let results = rows
        .into_iter()
        .map(|a| adjustment_response(a, &names))
        .collect();
    Ok(Json(ApiResponse::success(results)))
}

/// POST /api/salary-adjustments
pub async fn create_adjustment(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<AdjustmentRequest>,
) -> AppResult<Json<ApiResponse<AdjustmentResponse>>> {
    require_write(&state, &user).await?;
    let valid = req.validate()?;
    check_user_exists(&db, req.user_id).await?;

    let created = salary_adjustment::ActiveModel {
        user_id: Set(req.user_id),
        adjustment_type: Set(valid.kind),
        amount: Set(req.amount),
        reason: Set(valid.reason),
        period_start: Set(valid.period_start),
        period_end: Set(valid.period_end),
        created_by: Set(user.id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    tracing::info!(
        "{} of {} for user {} created by {}",
        valid.kind.display_name(),
        created.amount,
        created.user_id,
        user.username
    );
    let names = user_names(&db).await?;
    Ok(Json(ApiResponse::success(adjustment_response(created, &names))))
}

/// PUT /api/salary-adjustments/:id
pub async fn update_adjustment(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<AdjustmentRequest>,
) -> AppResult<Json<ApiResponse<AdjustmentResponse>>> {
    require_write(&state, &user).await?;
    let valid = req.validate()?;
    check_user_exists(&db, req.user_id).await?;
    let existing = salary_adjustment::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("adjustment not found")?;

    let mut active: salary_adjustment::ActiveModel = existing.into();
    active.user_id = Set(req.user_id);
    active.adjustment_type = Set(valid.kind);
    active.amount = Set(req.amount);
    active.reason = Set(valid.reason);
    active.period_start = Set(valid.period_start);
    active.period_end = Set(valid.period_end);
    let updated = active.update(&*db).await?;

    let names = user_names(&db).await?;
    Ok(Json(ApiResponse::success(adjustment_response(updated, &names))))
}

/// DELETE /api/salary-adjustments/:id
pub async fn delete_adjustment(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    require_write(&state, &user).await?;
    salary_adjustment::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("adjustment not found")?;
    salary_adjustment::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!("Adjustment {} deleted by {}", id, user.username);
    Ok(Json(ApiResponse::success_msg("adjustment deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::entity::user::Role;
    use crate::handlers::test_support::{as_user, conn, state};
    use crate::salary::service::tests::{d, make_user};

    #[tokio::test]
    async fn test_default_config_conflicts_unless_forced() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;

        let Json(resp) = create_default_config(state(&db).await, conn(&db), as_user(&owner), Json(DefaultConfigRequest::default()))
            .await
            .unwrap();
        let detail = resp.data.unwrap();
        assert_eq!(detail.config.name, "Default configuration");
        assert!(detail.manager_config.is_some());

        let err = create_default_config(state(&db).await, conn(&db), as_user(&owner), Json(DefaultConfigRequest::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        create_default_config(state(&db).await, conn(&db), as_user(&owner), Json(DefaultConfigRequest { force: true }))
            .await
            .unwrap();
        assert_eq!(config_service::list_configs(&db).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_manager_cannot_read_configs() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;

        let err = list_configs(state(&db).await, conn(&db), as_user(&manager)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_assignment_upsert_and_auto() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        make_user(&db, "installer", Role::Installer).await;
        let first = config_service::create_default_config(&db).await.unwrap();
        let second = config_service::create_config(
            &db,
            &ConfigParams {
                name: Some("Summer".to_string()),
                ..ConfigParams::default()
            },
        )
        .await
        .unwrap();

        let assign = |config_id| Json(AssignmentRequest { user_id: manager.id, config_id });
        create_assignment(state(&db).await, conn(&db), as_user(&owner), assign(first.id))
            .await
            .unwrap();
        create_assignment(state(&db).await, conn(&db), as_user(&owner), assign(second.id))
            .await
            .unwrap();

        let Json(resp) = list_assignments(state(&db).await, conn(&db), as_user(&owner)).await.unwrap();
        let rows = resp.data.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].config_name, "Summer");

        let Json(resp) = auto_assign(state(&db).await, conn(&db), as_user(&owner)).await.unwrap();
        assert_eq!(resp.data.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_inactive_config_cannot_be_assigned() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let installer = make_user(&db, "installer", Role::Installer).await;
        let config = config_service::create_default_config(&db).await.unwrap();
        config_service::set_active(&db, config.id, false).await.unwrap();

        let err = create_assignment(
            state(&db).await,
            conn(&db),
            as_user(&owner),
            Json(AssignmentRequest {
                user_id: installer.id,
                config_id: config.id,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    fn adjustment(user_id: i64, start: &str, end: &str) -> Json<AdjustmentRequest> {
        Json(AdjustmentRequest {
            user_id,
            adjustment_type: "penalty".to_string(),
            amount: d("-500"),
            reason: "Late arrival".to_string(),
            period_start: start.to_string(),
            period_end: end.to_string(),
        })
    }

    #[tokio::test]
    async fn test_adjustment_records_creator_and_checks_period() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let installer = make_user(&db, "installer", Role::Installer).await;

        let Json(resp) = create_adjustment(state(&db).await, conn(&db), as_user(&owner), adjustment(installer.id, "2024-01-01", "2024-01-31"))
            .await
            .unwrap();
        let created = resp.data.unwrap();
        assert_eq!(created.adjustment.created_by, owner.id);
        assert_eq!(created.type_display, "Penalty");
        assert_eq!(created.user_name, "installer");

        let err = create_adjustment(state(&db).await, conn(&db), as_user(&owner), adjustment(installer.id, "2024-02-01", "2024-01-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let query = AdjustmentQuery { user_id: Some(owner.id) };
        let Json(resp) = list_adjustments(state(&db).await, conn(&db), as_user(&owner), Query(query))
            .await
            .unwrap();
        assert!(resp.data.unwrap().is_empty());
    }
}
