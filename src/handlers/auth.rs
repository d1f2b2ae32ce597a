//! Authentication handlers
//!
//! Implements login, logout, and current user endpoints

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::entity::user::{self, Role, UserResponse};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{CurrentUser, SESSION_TIMESTAMP_KEY, SESSION_USER_KEY};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[cfg(not(test))]
const PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_COST: u32 = 4;

pub fn hash_password(password: &str) -> AppResult<String> {
    Ok(bcrypt::hash(password, PASSWORD_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Current user response
#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub role_display: String,
    /// Resources the role may read
    pub permissions: Vec<String>,
}

/// Look up the user and check the password and the active flag
pub async fn authenticate(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> AppResult<user::Model> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("username and password are required".to_string()));
    }

    let found = user::Entity::find()
        .filter(user::Column::Username.eq(username.trim()))
        .one(db)
        .await?;
    let Some(found) = found else {
        tracing::warn!("Login failed: user not found - {}", username);
        return Err(AppError::BadRequest("username or password error".to_string()));
    };

    if !verify_password(password, &found.password) {
        tracing::warn!("Login failed: wrong password - {}", username);
        return Err(AppError::BadRequest("username or password error".to_string()));
    }
    if !found.is_active {
        tracing::warn!("Login failed: user disabled - {}", username);
        return Err(AppError::BadRequest("user is disabled".to_string()));
    }
    Ok(found)
}

/// POST /api/login
pub async fn login(
    Extension(db): Extension<DbConn>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let found = authenticate(&db, &req.username, &req.password).await?;

    let mut active: user::ActiveModel = found.into();
    active.last_login = Set(Some(Utc::now()));
    let found = active.update(&*db).await?;

    session
        .insert(SESSION_USER_KEY, found.id)
        .await
        .map_err(|e| AppError::Internal(format!("failed to save session: {}", e)))?;
    if let Err(e) = session.insert(SESSION_TIMESTAMP_KEY, Utc::now().timestamp()).await {
        tracing::error!("Failed to save session timestamp: {}", e);
    }

    tracing::info!("User logged in: {}", found.username);
    Ok(Json(ApiResponse::success(UserResponse::from(found))))
}

/// POST /api/logout
pub async fn logout(session: Session) -> AppResult<Json<ApiResponse<()>>> {
    let user_id: Option<i64> = session.get(SESSION_USER_KEY).await.unwrap_or(None);
    session
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("failed to flush session: {}", e)))?;
    if let Some(id) = user_id {
        tracing::info!("User {} logged out", id);
    }
    Ok(Json(ApiResponse::success_msg("logout success")))
}

/// GET /api/user/current
pub async fn current_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Json<ApiResponse<CurrentUserResponse>> {
    let permissions = state.perm.readable(user.role).await;
    Json(ApiResponse::success(CurrentUserResponse {
        id: user.id,
        username: user.username,
        full_name: user.full_name,
        role: user.role,
        role_display: user.role.display_name().to_string(),
        permissions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::handlers::test_support::{as_user, state};
    use crate::salary::service::tests::make_user;

    #[tokio::test]
    async fn test_authenticate() {
        let db = test_db().await;
        let user = make_user(&db, "ivan", Role::Manager).await;

        assert_eq!(authenticate(&db, "ivan", "secret").await.unwrap().id, user.id);
        assert!(matches!(
            authenticate(&db, "ivan", "wrong").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            authenticate(&db, "nobody", "secret").await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_user_cannot_log_in() {
        let db = test_db().await;
        let user = make_user(&db, "ivan", Role::Installer).await;
        let mut active: user::ActiveModel = user.into();
        active.is_active = Set(false);
        active.update(&db).await.unwrap();

        match authenticate(&db, "ivan", "secret").await {
            Err(AppError::BadRequest(msg)) => assert_eq!(msg, "user is disabled"),
            other => panic!("unexpected result: {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[tokio::test]
    async fn test_current_user_lists_readable_resources() {
        let db = test_db().await;
        let user = make_user(&db, "installer", Role::Installer).await;

        let Json(resp) = current_user(state(&db).await, as_user(&user)).await;
        let data = resp.data.unwrap();
        assert_eq!(data.role_display, "Installer");
        assert!(data.permissions.contains(&"orders".to_string()));
        assert!(!data.permissions.contains(&"salary".to_string()));
    }
}
