//! Setup handlers
//!
//! First-run creation of the owner account

use axum::{Extension, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde::Deserialize;

use super::auth::hash_password;
use super::require_text;
use crate::entity::user::{self, Role, UserResponse};
use crate::error::{AppError, AppResult};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct InitOwnerRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// The system counts as initialized once an owner account exists
pub async fn owner_exists<C: ConnectionTrait>(db: &C) -> AppResult<bool> {
    let owners = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Owner))
        .count(db)
        .await?;
    Ok(owners > 0)
}

/// POST /api/setup/init/owner
pub async fn init_owner(
    Extension(db): Extension<DbConn>,
    Json(req): Json<InitOwnerRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    if owner_exists(&*db).await? {
        return Err(AppError::Conflict("owner account already exists".to_string()));
    }
    let username = require_text("username", &req.username, 150)?;
    if req.password.is_empty() {
        return Err(AppError::Validation("password is required".to_string()));
    }

    let owner = user::ActiveModel {
        username: Set(username),
        password: Set(hash_password(&req.password)?),
        first_name: Set(req.first_name.trim().to_string()),
        last_name: Set(req.last_name.trim().to_string()),
        email: Set(req.email.filter(|e| !e.trim().is_empty())),
        phone: Set(req.phone.filter(|p| !p.trim().is_empty())),
        role: Set(Role::Owner),
        is_active: Set(true),
        last_login: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    tracing::info!("Owner account created: {}", owner.username);
    Ok(Json(ApiResponse::success(UserResponse::from(owner))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::handlers::test_support::conn;

    fn request(username: &str) -> Json<InitOwnerRequest> {
        Json(InitOwnerRequest {
            username: username.to_string(),
            password: "secret".to_string(),
            first_name: "Anna".to_string(),
            last_name: "Petrova".to_string(),
            email: None,
            phone: None,
        })
    }

    #[tokio::test]
    async fn test_init_owner_only_once() {
        let db = test_db().await;
        assert!(!owner_exists(&db).await.unwrap());

        let Json(resp) = init_owner(conn(&db), request("anna")).await.unwrap();
        assert_eq!(resp.data.unwrap().role, Role::Owner);
        assert!(owner_exists(&db).await.unwrap());

        let err = init_owner(conn(&db), request("boris")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
