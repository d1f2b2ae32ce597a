//! Salary payment handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{paginate, Page};
use crate::entity::{salary_payment, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::finance::ledger;
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::salary::period::parse_date;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PaymentQuery {
    pub user_id: Option<i64>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub user_id: i64,
    pub amount: Decimal,
    pub period_start: String,
    pub period_end: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    #[serde(flatten)]
    pub payment: salary_payment::Model,
    pub user_name: String,
}

/// GET /api/salary-payments
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PaymentQuery>,
) -> AppResult<Json<ApiResponse<Page<PaymentResponse>>>> {
    state.perm.require(&user, res::SALARY_PAYMENTS, action::READ).await?;

    let mut select = salary_payment::Entity::find();
    if !user.is_owner() {
        select = select.filter(salary_payment::Column::UserId.eq(user.id));
    } else if let Some(user_id) = query.user_id {
        select = select.filter(salary_payment::Column::UserId.eq(user_id));
    }
    let select = select
        .order_by_desc(salary_payment::Column::CreatedAt)
        .order_by_desc(salary_payment::Column::Id);
    let page = paginate(&db, select, query.page, query.page_size).await?;

    let ids: Vec<i64> = page.results.iter().map(|p| p.user_id).collect();
    let names: HashMap<i64, String> = user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(&*db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.full_name()))
        .collect();

    Ok(Json(ApiResponse::success(page.map(|payment| PaymentResponse {
        user_name: names.get(&payment.user_id).cloned().unwrap_or_default(),
        payment,
    }))))
}

/// POST /api/salary-payments
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PaymentRequest>,
) -> AppResult<Json<ApiResponse<PaymentResponse>>> {
    state.perm.require(&user, res::SALARY_PAYMENTS, action::WRITE).await?;

    let period_start = parse_date(&req.period_start)?;
    let period_end = parse_date(&req.period_end)?;
    let employee = user::Entity::find_by_id(req.user_id)
        .one(&*db)
        .await?
        .ok_or_else(|| AppError::Validation(format!("user {} does not exist", req.user_id)))?;

    let payment = ledger::record_salary_payment(&db, &employee, req.amount, period_start, period_end).await?;
    Ok(Json(ApiResponse::success(PaymentResponse {
        user_name: employee.full_name(),
        payment,
    })))
}

/// DELETE /api/salary-payments/:id
pub async fn delete_payment(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.perm.require(&user, res::SALARY_PAYMENTS, action::WRITE).await?;
    salary_payment::Entity::find_by_id(id)
        .one(&*db)
        .await?
        .ok_or_not_found("salary payment not found")?;
    salary_payment::Entity::delete_by_id(id).exec(&*db).await?;

    tracing::info!("Salary payment {} deleted by {}", id, user.username);
    Ok(Json(ApiResponse::success_msg("salary payment deleted")))
}
