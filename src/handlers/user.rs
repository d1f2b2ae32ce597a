//! User handlers
//!
//! Implements user CRUD operations and the self-service profile endpoints

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;

use super::auth::{hash_password, verify_password};
use super::{paginate, parse_choice, require_text, scope, search_term, Page};
use crate::entity::user::{self, Role, UserResponse};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// Create user request
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: String,
}

/// Update user request; absent fields stay unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Change password request (user changes their own password)
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn username_taken(db: &DbConn, username: &str, except: Option<i64>) -> AppResult<bool> {
    let mut query = user::Entity::find().filter(user::Column::Username.eq(username));
    if let Some(id) = except {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.count(&**db).await? > 0)
}

async fn find_user(db: &DbConn, id: i64) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(&**db)
        .await?
        .ok_or_not_found("user not found")
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ApiResponse<Page<UserResponse>>>> {
    state.perm.require(&current, res::USERS, action::READ).await?;

    let mut select = user::Entity::find().filter(scope::users(&current));
    if let Some(role) = query.role.as_deref().filter(|r| !r.is_empty()) {
        let role: Role = parse_choice("role", role)?;
        select = select.filter(user::Column::Role.eq(role));
    }
    if let Some(term) = search_term(query.search.as_deref()) {
        select = select.filter(
            Condition::any()
                .add(user::Column::Username.contains(term))
                .add(user::Column::FirstName.contains(term))
                .add(user::Column::LastName.contains(term))
                .add(user::Column::Email.contains(term)),
        );
    }
    let select = select
        .order_by_asc(user::Column::LastName)
        .order_by_asc(user::Column::FirstName)
        .order_by_asc(user::Column::Id);

    let page = paginate(&db, select, query.page, query.page_size).await?;
    Ok(Json(ApiResponse::success(page.map(UserResponse::from))))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    state.perm.require(&current, res::USERS, action::READ).await?;

    let found = user::Entity::find_by_id(id)
        .filter(scope::users(&current))
        .one(&*db)
        .await?
        .ok_or_not_found("user not found")?;
    Ok(Json(ApiResponse::success(UserResponse::from(found))))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    state.perm.require(&current, res::USERS, action::WRITE).await?;

    let username = require_text("username", &req.username, 150)?;
    if req.password.is_empty() {
        return Err(AppError::Validation("password is required".to_string()));
    }
    let role: Role = parse_choice("role", &req.role)?;
    if username_taken(&db, &username, None).await? {
        return Err(AppError::Conflict(format!("username '{}' already exists", username)));
    }

    let created = user::ActiveModel {
        username: Set(username),
        password: Set(hash_password(&req.password)?),
        first_name: Set(req.first_name.trim().to_string()),
        last_name: Set(req.last_name.trim().to_string()),
        email: Set(optional_text(req.email)),
        phone: Set(optional_text(req.phone)),
        role: Set(role),
        is_active: Set(true),
        last_login: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    tracing::info!("User created: {} ({}) by {}", created.username, role.as_str(), current.username);
    Ok(Json(ApiResponse::success(UserResponse::from(created))))
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    state.perm.require(&current, res::USERS, action::WRITE).await?;

    let existing = find_user(&db, id).await?;
    let mut active: user::ActiveModel = existing.into();

    if let Some(username) = req.username {
        let username = require_text("username", &username, 150)?;
        if username_taken(&db, &username, Some(id)).await? {
            return Err(AppError::Conflict(format!("username '{}' already exists", username)));
        }
        active.username = Set(username);
    }
    if let Some(password) = req.password.filter(|p| !p.is_empty()) {
        active.password = Set(hash_password(&password)?);
    }
    if let Some(first_name) = req.first_name {
        active.first_name = Set(first_name.trim().to_string());
    }
    if let Some(last_name) = req.last_name {
        active.last_name = Set(last_name.trim().to_string());
    }
    if req.email.is_some() {
        active.email = Set(optional_text(req.email));
    }
    if req.phone.is_some() {
        active.phone = Set(optional_text(req.phone));
    }
    if let Some(role) = req.role {
        active.role = Set(parse_choice("role", &role)?);
    }
    if let Some(is_active) = req.is_active {
        active.is_active = Set(is_active);
    }

    let updated = active.update(&*db).await?;
    tracing::info!("User updated: {} by {}", updated.username, current.username);
    Ok(Json(ApiResponse::success(UserResponse::from(updated))))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.perm.require(&current, res::USERS, action::WRITE).await?;
    if id == current.id {
        return Err(AppError::BadRequest("you cannot delete your own account".to_string()));
    }

    let existing = find_user(&db, id).await?;
    user::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!("User deleted: {} by {}", existing.username, current.username);
    Ok(Json(ApiResponse::success_msg("user deleted")))
}

/// POST /api/users/:id/toggle-active
pub async fn toggle_active(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    state.perm.require(&current, res::USERS, action::WRITE).await?;
    if id == current.id {
        return Err(AppError::BadRequest("you cannot deactivate your own account".to_string()));
    }

    let existing = find_user(&db, id).await?;
    let is_active = !existing.is_active;
    let mut active: user::ActiveModel = existing.into();
    active.is_active = Set(is_active);
    let updated = active.update(&*db).await?;

    tracing::info!(
        "User {} {} by {}",
        updated.username,
        if is_active { "enabled" } else { "disabled" },
        current.username
    );
    Ok(Json(ApiResponse::success(UserResponse::from(updated))))
}

/// PUT /api/profile
pub async fn update_profile(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ProfileRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let existing = find_user(&db, current.id).await?;
    let mut active: user::ActiveModel = existing.into();

    if let Some(first_name) = req.first_name {
        active.first_name = Set(first_name.trim().to_string());
    }
    if let Some(last_name) = req.last_name {
        active.last_name = Set(last_name.trim().to_string());
    }
    if req.email.is_some() {
        active.email = Set(optional_text(req.email));
    }
    if req.phone.is_some() {
        active.phone = Set(optional_text(req.phone));
    }

    let updated = active.update(&*db).await?;
    Ok(Json(ApiResponse::success(UserResponse::from(updated))))
}

/// POST /api/profile/password
pub async fn change_password(
    Extension(db): Extension<DbConn>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    if req.new_password.is_empty() {
        return Err(AppError::Validation("new password is required".to_string()));
    }

    let existing = find_user(&db, current.id).await?;
    if !verify_password(&req.old_password, &existing.password) {
        tracing::warn!("Password change failed: wrong old password - {}", current.username);
        return Err(AppError::BadRequest("old password is incorrect".to_string()));
    }

    let mut active: user::ActiveModel = existing.into();
    active.password = Set(hash_password(&req.new_password)?);
    active.update(&*db).await?;

    tracing::info!("Password changed: {}", current.username);
    Ok(Json(ApiResponse::success_msg("password changed")))
}
