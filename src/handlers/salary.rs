//! Salary calculation handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::entity::{salary_adjustment, salary_config, user, user_salary_assignment};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::salary::config_service::users_without_config;
use crate::salary::engine::OwnerSalary;
use crate::salary::{service, SalaryPeriod, SalaryReport};
use crate::state::AppState;

const RECENT_ADJUSTMENT_DAYS: i64 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub user_id: Option<i64>,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Serialize)]
pub struct UserSalary {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    #[serde(flatten)]
    pub report: SalaryReport,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Calculation {
    User(UserSalary),
    Owner(OwnerSalary),
}

#[derive(Debug, Serialize)]
pub struct SalaryStats {
    pub total_configs: u64,
    pub active_configs: u64,
    pub total_assignments: u64,
    pub users_without_config: u64,
    pub recent_adjustments: u64,
}

async fn calculate(db: &DbConn, employee: user::Model, period: &SalaryPeriod) -> AppResult<UserSalary> {
    let report = service::calculate_for_user(&**db, &employee, period).await?;
    Ok(UserSalary {
        user_id: employee.id,
        full_name: employee.full_name(),
        username: employee.username,
        report,
    })
}

async fn find_employee(db: &DbConn, id: i64) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(&**db)
        .await?
        .ok_or_not_found("user not found")
}

/// GET /api/finance/calculate-salary/:user_id
pub async fn calculate_user_salary(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(user_id): Path<i64>,
    Query(query): Query<PeriodQuery>,
) -> AppResult<Json<ApiResponse<UserSalary>>> {
    if user.id != user_id && !state.perm.check(user.role, res::SALARY, action::READ).await {
        tracing::warn!("{} tried to read the salary of user {}", user.username, user_id);
        return Err(AppError::Forbidden);
    }
    let period = SalaryPeriod::resolve(query.start_date.as_deref(), query.end_date.as_deref(), Utc::now())?;
    let employee = find_employee(&db, user_id).await?;

    Ok(Json(ApiResponse::success(calculate(&db, employee, &period).await?)))
}

/// POST /api/salary/calculate
pub async fn calculate_salary(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CalculateRequest>,
) -> AppResult<Json<ApiResponse<Calculation>>> {
    state.perm.require(&user, res::SALARY, action::READ).await?;
    if req.start_date.trim().is_empty() || req.end_date.trim().is_empty() {
        return Err(AppError::Validation("start_date and end_date are required".to_string()));
    }
    let period = SalaryPeriod::resolve(Some(&req.start_date), Some(&req.end_date), Utc::now())?;

    let result = match req.user_id {
        Some(id) => Calculation::User(calculate(&db, find_employee(&db, id).await?, &period).await?),
        None => Calculation::Owner(service::calculate_owner(&*db, &period).await?),
    };
    Ok(Json(ApiResponse::success(result)))
}

/// GET /api/salary/overview
pub async fn salary_overview(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PeriodQuery>,
) -> AppResult<Json<ApiResponse<Vec<UserSalary>>>> {
    state.perm.require(&user, res::SALARY, action::READ).await?;
    let period = SalaryPeriod::resolve(query.start_date.as_deref(), query.end_date.as_deref(), Utc::now())?;

    let employees = user::Entity::find()
        .filter(user::Column::IsActive.eq(true))
        .order_by_asc(user::Column::Role)
        .order_by_asc(user::Column::Id)
        .all(&*db)
        .await?;

    let mut results = Vec::with_capacity(employees.len());
    for employee in employees {
        results.push(calculate(&db, employee, &period).await?);
    }
    Ok(Json(ApiResponse::success(results)))
}

/// GET /api/salary/stats
pub async fn salary_stats(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<SalaryStats>>> {
    state.perm.require(&user, res::SALARY, action::READ).await?;

    let since = Utc::now() - Duration::days(RECENT_ADJUSTMENT_DAYS);
    Ok(Json(ApiResponse::success(SalaryStats {
        total_configs: salary_config::Entity::find().count(&*db).await?,
        active_configs: salary_config::Entity::find()
            .filter(salary_config::Column::IsActive.eq(true))
            .count(&*db)
            .await?,
        total_assignments: user_salary_assignment::Entity::find().count(&*db).await?,
        users_without_config: users_without_config(&*db).await?.len() as u64,
        recent_adjustments: salary_adjustment::Entity::find()
            .filter(salary_adjustment::Column::CreatedAt.gte(since))
            .count(&*db)
            .await?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::entity::service::ServiceCategory;
    use crate::entity::user::Role;
    use crate::handlers::test_support::{as_user, conn, state};
    use crate::salary::config_service;
    use crate::salary::service::tests::{d, jan_at, make_completed_order, make_service, make_user};

    fn january() -> Query<PeriodQuery> {
        Query(PeriodQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
        })
    }

    #[tokio::test]
    async fn test_user_reads_own_salary_only() {
        let db = test_db().await;
        let installer = make_user(&db, "installer", Role::Installer).await;
        let other = make_user(&db, "other", Role::Installer).await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let extra = make_service(&db, ServiceCategory::Additional, "1000", "3000").await;
        make_completed_order(&db, manager.id, &[installer.id], &[(&extra, installer.id, "3000")], jan_at(9)).await;

        let Json(resp) = calculate_user_salary(state(&db).await, conn(&db), as_user(&installer), Path(installer.id), january())
            .await
            .unwrap();
        let salary = resp.data.unwrap();
        assert_eq!(salary.report.total_salary(), d("2100"));
        assert_eq!(salary.report.role(), Role::Installer);

        let err = calculate_user_salary(state(&db).await, conn(&db), as_user(&installer), Path(other.id), january())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_owner_reads_any_salary() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let manager = make_user(&db, "manager", Role::Manager).await;

        let Json(resp) = calculate_user_salary(state(&db).await, conn(&db), as_user(&owner), Path(manager.id), january())
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().report.total_salary(), d("30000"));

        let err = calculate_user_salary(state(&db).await, conn(&db), as_user(&owner), Path(9999), january())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_calculate_requires_dates() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;

        let req = Json(CalculateRequest {
            user_id: None,
            start_date: String::new(),
            end_date: "2024-01-31".to_string(),
        });
        let err = calculate_salary(state(&db).await, conn(&db), as_user(&owner), req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let req = Json(CalculateRequest {
            user_id: None,
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-31".to_string(),
        });
        let Json(resp) = calculate_salary(state(&db).await, conn(&db), as_user(&owner), req).await.unwrap();
        match resp.data.unwrap() {
            Calculation::Owner(salary) => assert_eq!(salary.period, "2024-01-01 - 2024-01-31"),
            Calculation::User(_) => panic!("expected the owner calculation"),
        }
    }

    #[tokio::test]
    async fn test_overview_and_stats() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        make_user(&db, "installer", Role::Installer).await;
        let config = config_service::create_default_config(&db).await.unwrap();
        config_service::assign_config_to_user(&db, manager.id, config.id).await.unwrap();

        let Json(resp) = salary_overview(state(&db).await, conn(&db), as_user(&owner), january())
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().len(), 3);

        let Json(resp) = salary_stats(state(&db).await, conn(&db), as_user(&owner)).await.unwrap();
        let stats = resp.data.unwrap();
        assert_eq!(stats.total_configs, 1);
        assert_eq!(stats.active_configs, 1);
        assert_eq!(stats.total_assignments, 1);
        assert_eq!(stats.users_without_config, 2);
        assert_eq!(stats.recent_adjustments, 0);

        let err = salary_stats(state(&db).await, conn(&db), as_user(&manager)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }
}
