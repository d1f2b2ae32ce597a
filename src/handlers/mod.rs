//! Request handlers module

use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, Select};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, AppResult};

pub mod auth;
pub mod client;
pub mod dashboard;
pub mod export;
pub mod finance;
pub mod order;
pub mod salary;
pub mod salary_config;
pub mod salary_payment;
pub mod scope;
pub mod service;
pub mod setup;
pub mod user;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// One page of a list endpoint
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub results: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

impl<T: Serialize> Page<T> {
    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Clamp `page` to >= 1 and `page_size` to `1..=MAX_PAGE_SIZE`
pub fn page_params(page: Option<u64>, page_size: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

pub async fn paginate<E>(
    db: &DatabaseConnection,
    query: Select<E>,
    page: Option<u64>,
    page_size: Option<u64>,
) -> AppResult<Page<E::Model>>
where
    E: EntityTrait,
    E::Model: Serialize + Sync,
{
    let (page, page_size) = page_params(page, page_size);
    let paginator = query.paginate(db, page_size);
    let total = paginator.num_items().await?;
    let results = paginator.fetch_page(page - 1).await?;
    Ok(Page {
        results,
        total,
        page,
        page_size,
    })
}

/// Parse a snake_case enum value coming from a request, 400 on anything else
pub fn parse_choice<T: DeserializeOwned>(field: &str, value: &str) -> AppResult<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_string()))
        .map_err(|_| AppError::Validation(format!("invalid {}: '{}'", field, value)))
}

pub fn require_text(field: &str, value: &str, max_len: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}

/// Trimmed search term, `None` when blank
pub fn search_term(term: Option<&str>) -> Option<&str> {
    term.map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::extract::State;
    use axum::Extension;
    use sea_orm::DatabaseConnection;

    use crate::config::Config;
    use crate::entity::user;
    use crate::middleware::{CurrentUser, DbConn};
    use crate::permission::PermissionEnforcer;
    use crate::state::AppState;

    pub async fn state(db: &DatabaseConnection) -> State<AppState> {
        let perm = PermissionEnforcer::new().await.unwrap();
        State(AppState::new(db.clone(), perm, Config::default()))
    }

    pub fn conn(db: &DatabaseConnection) -> Extension<DbConn> {
        Extension(DbConn(db.clone()))
    }

    pub fn as_user(user: &user::Model) -> Extension<CurrentUser> {
        Extension(CurrentUser::from(user))
    }
}
