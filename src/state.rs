use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::permission::PermissionEnforcer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub perm: PermissionEnforcer,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, perm: PermissionEnforcer, config: Config) -> Self {
        Self {
            db,
            perm,
            config: Arc::new(config),
        }
    }
}
