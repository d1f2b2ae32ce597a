//! Finance handlers
//!
//! Ledger CRUD plus the balance and statistics views. Owner only.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use super::{paginate, parse_choice, require_text, search_term, Page};
use crate::entity::transaction::{self, TransactionType};
use crate::error::{AppError, AppResult, OptionExt};
use crate::finance::ledger::company_balance;
use crate::finance::stats::{self, CategoryAmount, DayTotals, MonthTotals, Totals};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::salary::period::{start_of_day, start_of_month};
use crate::state::AppState;

const BALANCE_MONTHS: u32 = 6;
const DEFAULT_STATS_DAYS: u32 = 30;
const MAX_STATS_DAYS: u32 = 366;
const EXPENSE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: Decimal,
    pub description: String,
    pub order_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    #[serde(flatten)]
    pub transaction: transaction::Model,
    pub type_display: String,
}

impl From<transaction::Model> for TransactionResponse {
    fn from(transaction: transaction::Model) -> Self {
        Self {
            type_display: transaction.kind.display_name().to_string(),
            transaction,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
    pub monthly: Vec<MonthTotals>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub days: u32,
    pub month: Totals,
    pub daily: Vec<DayTotals>,
}

impl TransactionRequest {
    fn validate(&self) -> AppResult<(TransactionType, String)> {
        let kind = parse_choice("type", &self.kind)?;
        if self.amount < Decimal::ZERO {
            return Err(AppError::Validation("amount must not be negative".to_string()));
        }
        let description = require_text("description", &self.description, 1000)?;
        Ok((kind, description))
    }
}

async fn transactions_since(db: &DbConn, since: DateTime<Utc>) -> AppResult<Vec<transaction::Model>> {
    Ok(transaction::Entity::find()
        .filter(transaction::Column::CreatedAt.gte(since))
        .all(&**db)
        .await?)
}

async fn find_transaction(db: &DbConn, id: i64) -> AppResult<transaction::Model> {
    transaction::Entity::find_by_id(id)
        .one(&**db)
        .await?
        .ok_or_not_found("transaction not found")
}

/// GET /api/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<ApiResponse<Page<TransactionResponse>>>> {
    state.perm.require(&user, res::TRANSACTIONS, action::READ).await?;

    let mut select = transaction::Entity::find();
    if let Some(kind) = query.kind.as_deref().filter(|k| !k.is_empty()) {
        let kind: TransactionType = parse_choice("type", kind)?;
        select = select.filter(transaction::Column::Kind.eq(kind));
    }
    if let Some(term) = search_term(query.search.as_deref()) {
        select = select.filter(transaction::Column::Description.contains(term));
    }
    let select = select
        .order_by_desc(transaction::Column::CreatedAt)
        .order_by_desc(transaction::Column::Id);

    let page = paginate(&db, select, query.page, query.page_size).await?;
    Ok(Json(ApiResponse::success(page.map(TransactionResponse::from))))
}

/// GET /api/transactions/:id
pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<TransactionResponse>>> {
    state.perm.require(&user, res::TRANSACTIONS, action::READ).await?;
    let found = find_transaction(&db, id).await?;
    Ok(Json(ApiResponse::success(TransactionResponse::from(found))))
}

/// POST /api/transactions
pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<TransactionRequest>,
) -> AppResult<Json<ApiResponse<TransactionResponse>>> {
    state.perm.require(&user, res::TRANSACTIONS, action::WRITE).await?;
    let (kind, description) = req.validate()?;

    let created = transaction::ActiveModel {
        kind: Set(kind),
        amount: Set(req.amount),
        description: Set(description),
        order_id: Set(req.order_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    tracing::info!("Transaction {} created: {} {}", created.id, kind.display_name(), created.amount);
    Ok(Json(ApiResponse::success(TransactionResponse::from(created))))
}

/// PUT /api/transactions/:id
pub async fn update_transaction(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<TransactionRequest>,
) -> AppResult<Json<ApiResponse<TransactionResponse>>> {
    state.perm.require(&user, res::TRANSACTIONS, action::WRITE).await?;
    let (kind, description) = req.validate()?;
    let existing = find_transaction(&db, id).await?;

    let mut active: transaction::ActiveModel = existing.into();
    active.kind = Set(kind);
    active.amount = Set(req.amount);
    active.description = Set(description);
    active.order_id = Set(req.order_id);
    let updated = active.update(&*db).await?;

    tracing::info!("Transaction {} updated by {}", id, user.username);
    Ok(Json(ApiResponse::success(TransactionResponse::from(updated))))
}

/// DELETE /api/transactions/:id
pub async fn delete_transaction(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.perm.require(&user, res::TRANSACTIONS, action::WRITE).await?;
    find_transaction(&db, id).await?;
    transaction::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!("Transaction {} deleted by {}", id, user.username);
    Ok(Json(ApiResponse::success_msg("transaction deleted")))
}

/// GET /api/finance/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<BalanceResponse>>> {
    state.perm.require(&user, res::FINANCE, action::READ).await?;

    let now = Utc::now();
    let since = stats::month_start_back(now.date_naive(), BALANCE_MONTHS - 1);
    let rows = transactions_since(&db, start_of_day(since)).await?;

    Ok(Json(ApiResponse::success(BalanceResponse {
        balance: company_balance(&*db).await?,
        monthly: stats::monthly(&rows, now, BALANCE_MONTHS),
    })))
}

/// GET /api/finance/stats?days=30
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<ApiResponse<StatsResponse>>> {
    state.perm.require(&user, res::FINANCE, action::READ).await?;

    let days = query.days.unwrap_or(DEFAULT_STATS_DAYS).clamp(1, MAX_STATS_DAYS);
    let now = Utc::now();
    let month_start = start_of_month(now);
    let window_start = start_of_day(now.date_naive() - Duration::days(days as i64 - 1));
    let rows = transactions_since(&db, month_start.min(window_start)).await?;

    let month = Totals::of(rows.iter().filter(|t| t.created_at >= month_start));
    Ok(Json(ApiResponse::success(StatsResponse {
        days,
        month,
        daily: stats::daily(&rows, now, days),
    })))
}

/// GET /api/finance/expense-categories
pub async fn expense_categories(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<CategoryAmount>>>> {
    state.perm.require(&user, res::FINANCE, action::READ).await?;

    let rows = transactions_since(&db, Utc::now() - Duration::days(EXPENSE_WINDOW_DAYS)).await?;
    Ok(Json(ApiResponse::success(stats::expense_categories(&rows))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::entity::user::Role;
    use crate::handlers::test_support::{as_user, conn, state};
    use crate::salary::service::tests::{d, make_user};

    fn body(kind: &str, amount: &str, description: &str) -> Json<TransactionRequest> {
        Json(TransactionRequest {
            kind: kind.to_string(),
            amount: d(amount),
            description: description.to_string(),
            order_id: None,
        })
    }

    #[tokio::test]
    async fn test_owner_books_and_reads_balance() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;

        create_transaction(state(&db).await, conn(&db), as_user(&owner), body("income", "5000", "Advance"))
            .await
            .unwrap();
        create_transaction(state(&db).await, conn(&db), as_user(&owner), body("expense", "1200", "Fuel"))
            .await
            .unwrap();

        let Json(resp) = get_balance(state(&db).await, conn(&db), as_user(&owner)).await.unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.balance, d("3800"));
        assert_eq!(data.monthly.len(), 6);
        assert_eq!(data.monthly[5].totals.profit, d("3800"));

        let Json(resp) = get_stats(state(&db).await, conn(&db), as_user(&owner), Query(StatsQuery { days: Some(7) }))
            .await
            .unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.daily.len(), 7);
        assert_eq!(data.month.income, d("5000"));
        assert_eq!(data.daily[6].totals.expense, d("1200"));

        let Json(resp) = expense_categories(state(&db).await, conn(&db), as_user(&owner)).await.unwrap();
        let categories = resp.data.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "Transport");
    }

    #[tokio::test]
    async fn test_transactions_are_owner_only() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;

        let err = list_transactions(state(&db).await, conn(&db), as_user(&manager), Query(TransactionQuery::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        let err = get_balance(state(&db).await, conn(&db), as_user(&manager)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_invalid_transaction_is_rejected() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;

        let err = create_transaction(state(&db).await, conn(&db), as_user(&owner), body("gift", "10", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = create_transaction(state(&db).await, conn(&db), as_user(&owner), body("income", "-10", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_type_filter() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        create_transaction(state(&db).await, conn(&db), as_user(&owner), body("income", "10", "a"))
            .await
            .unwrap();
        create_transaction(state(&db).await, conn(&db), as_user(&owner), body("expense", "5", "b"))
            .await
            .unwrap();

        let query = TransactionQuery {
            kind: Some("expense".to_string()),
            ..TransactionQuery::default()
        };
        let Json(resp) = list_transactions(state(&db).await, conn(&db), as_user(&owner), Query(query))
            .await
            .unwrap();
        let page = resp.data.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.results[0].type_display, "Expense");
    }
}
