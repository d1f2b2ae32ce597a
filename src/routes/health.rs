use axum::{extract::State, response::Json};
use serde::Serialize;

use super::ApiResponse;
use crate::error::AppResult;
use crate::handlers::setup::owner_exists;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct SetupStatus {
    pub initialized: bool,
}

/// Health check endpoint
pub async fn health_check() -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Initialized once an owner account exists.
/// Returns {"initialized": bool} without the ApiResponse wrapper
pub async fn setup_status(State(state): State<AppState>) -> AppResult<Json<SetupStatus>> {
    Ok(Json(SetupStatus {
        initialized: owner_exists(&state.db).await?,
    }))
}
