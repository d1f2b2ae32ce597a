//! Authentication middleware
//!
//! Provides session-based authentication for API routes

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Serialize;
use serde_json::json;
use std::ops::Deref;
use tower_sessions::Session;

use crate::entity::user::{self, Role};
use crate::state::AppState;

/// Session key for storing the user id
pub const SESSION_USER_KEY: &str = "user";
pub const SESSION_TIMESTAMP_KEY: &str = "timestamp";

/// Database connection wrapper for use in handlers via Extension
#[derive(Clone)]
pub struct DbConn(pub DatabaseConnection);

impl Deref for DbConn {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Extension to store current user in request
#[derive(Clone, Debug, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    pub fn is_installer(&self) -> bool {
        self.role == Role::Installer
    }
}

impl From<&user::Model> for CurrentUser {
    fn from(model: &user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username.clone(),
            full_name: model.full_name(),
            role: model.role,
        }
    }
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    if !path.starts_with("/api") {
        return true;
    }
    if path == "/api/login" || path == "/api/logout" || path == "/api/health" {
        return true;
    }
    path.starts_with("/api/setup/")
}

fn reject(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({"code": false, "message": error}))).into_response()
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    session: Session,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    request.extensions_mut().insert(DbConn(state.db.clone()));

    if is_public_path(&path) {
        return next.run(request).await;
    }

    let user_id: Option<i64> = session.get(SESSION_USER_KEY).await.unwrap_or(None);
    let Some(user_id) = user_id else {
        return reject(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    match user::Entity::find_by_id(user_id).one(&state.db).await {
        Ok(Some(model)) if model.is_active => {
            request.extensions_mut().insert(CurrentUser::from(&model));
            next.run(request).await
        }
        Ok(Some(model)) => {
            tracing::warn!("Inactive user tried to use a session: {}", model.username);
            let _ = session.flush().await;
            reject(StatusCode::UNAUTHORIZED, "account disabled")
        }
        Ok(None) => {
            tracing::warn!("User not found in database: {}", user_id);
            reject(StatusCode::UNAUTHORIZED, "invalid_session")
        }
        Err(e) => {
            tracing::error!("Database error during auth: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
