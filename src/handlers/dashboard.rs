//! Dashboard and analytics handlers

use axum::{extract::State, response::Json, Extension};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::order::{summaries, OrderSummary};
use super::scope;
use crate::entity::client::{self, ClientSource};
use crate::entity::order::{self, OrderStatus};
use crate::entity::transaction;
use crate::entity::user::{self, Role};
use crate::error::{AppResult, OptionExt};
use crate::finance::ledger::company_balance;
use crate::finance::stats::{month_key, month_start_back, Totals};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::salary::period::{start_of_day, start_of_month};
use crate::salary::{service, SalaryPeriod};
use crate::state::AppState;

const ANALYTICS_MONTHS: u32 = 6;
const TOP_MANAGERS: usize = 5;
const RECENT_ORDERS: u64 = 5;

#[derive(Debug, Default, Serialize)]
pub struct OrderCounts {
    pub total_orders: u64,
    pub completed_orders: u64,
    pub in_progress_orders: u64,
    pub orders_this_month: u64,
}

#[derive(Debug, Serialize)]
pub struct OwnerStats {
    #[serde(flatten)]
    pub orders: OrderCounts,
    pub total_clients: u64,
    pub clients_this_month: u64,
    pub company_balance: Decimal,
    pub income_this_month: Decimal,
    pub expenses_this_month: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ManagerStats {
    #[serde(flatten)]
    pub orders: OrderCounts,
    pub total_revenue: Decimal,
    pub revenue_this_month: Decimal,
    pub manager_clients: u64,
    pub salary_this_month: Decimal,
}

#[derive(Debug, Serialize)]
pub struct InstallerStats {
    #[serde(flatten)]
    pub orders: OrderCounts,
    pub salary_this_month: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RoleStats {
    Owner(OwnerStats),
    Manager(ManagerStats),
    Installer(InstallerStats),
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub role: Role,
    #[serde(flatten)]
    pub stats: RoleStats,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct MonthOrders {
    pub month: String,
    pub count: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct SourceCount {
    pub source: ClientSource,
    pub source_display: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct TopManager {
    pub manager_id: i64,
    pub full_name: String,
    pub orders_count: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct Analytics {
    pub orders_by_month: Vec<MonthOrders>,
    pub clients_by_source: Vec<SourceCount>,
    pub top_managers: Vec<TopManager>,
    pub recent_orders: Vec<OrderSummary>,
}

async fn order_counts<C: ConnectionTrait>(
    db: &C,
    scope: Condition,
    month_start: DateTime<Utc>,
) -> AppResult<OrderCounts> {
    let scoped = || order::Entity::find().filter(scope.clone());
    Ok(OrderCounts {
        total_orders: scoped().count(db).await?,
        completed_orders: scoped()
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .count(db)
            .await?,
        in_progress_orders: scoped()
            .filter(order::Column::Status.eq(OrderStatus::InProgress))
            .count(db)
            .await?,
        orders_this_month: scoped()
            .filter(order::Column::CreatedAt.gte(month_start))
            .count(db)
            .await?,
    })
}

async fn salary_this_month<C: ConnectionTrait>(db: &C, user_id: i64, now: DateTime<Utc>) -> AppResult<Decimal> {
    let employee = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_not_found("user not found")?;
    let report = service::calculate_for_user(db, &employee, &SalaryPeriod::current_month(now)).await?;
    Ok(report.total_salary())
}

async fn owner_stats<C: ConnectionTrait>(db: &C, now: DateTime<Utc>) -> AppResult<OwnerStats> {
    let month_start = start_of_month(now);
    let month_rows = transaction::Entity::find()
        .filter(transaction::Column::CreatedAt.gte(month_start))
        .all(db)
        .await?;
    let month = Totals::of(&month_rows);

    Ok(OwnerStats {
        orders: order_counts(db, Condition::all(), month_start).await?,
        total_clients: client::Entity::find().count(db).await?,
        clients_this_month: client::Entity::find()
            .filter(client::Column::CreatedAt.gte(month_start))
            .count(db)
            .await?,
        company_balance: company_balance(db).await?,
        income_this_month: month.income,
        expenses_this_month: month.expense,
    })
}

async fn manager_stats<C: ConnectionTrait>(db: &C, manager_id: i64, now: DateTime<Utc>) -> AppResult<ManagerStats> {
    let month_start = start_of_month(now);
    let own = Condition::all().add(order::Column::ManagerId.eq(manager_id));

    let orders = order::Entity::find().filter(own.clone()).all(db).await?;
    let completed = orders.iter().filter(|o| o.status == OrderStatus::Completed);
    let total_revenue: Decimal = completed.clone().map(|o| o.total_cost).sum();
    let revenue_this_month: Decimal = completed
        .filter(|o| o.completed_at.map_or(false, |at| at >= month_start))
        .map(|o| o.total_cost)
        .sum();
    let clients: BTreeSet<i64> = orders.iter().map(|o| o.client_id).collect();

    Ok(ManagerStats {
        orders: order_counts(db, own, month_start).await?,
        total_revenue,
        revenue_this_month,
        manager_clients: clients.len() as u64,
        salary_this_month: salary_this_month(db, manager_id, now).await?,
    })
}

async fn installer_stats<C: ConnectionTrait>(db: &C, installer_id: i64, now: DateTime<Utc>) -> AppResult<InstallerStats> {
    let ids = scope::assigned_order_ids(db, installer_id).await?;
    let assigned = Condition::all().add(order::Column::Id.is_in(ids));

    Ok(InstallerStats {
        orders: order_counts(db, assigned, start_of_month(now)).await?,
        salary_this_month: salary_this_month(db, installer_id, now).await?,
    })
}

/// GET /api/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    state.perm.require(&user, res::DASHBOARD, action::READ).await?;

    let now = Utc::now();
    let stats = match user.role {
        Role::Owner => RoleStats::Owner(owner_stats(&*db, now).await?),
        Role::Manager => RoleStats::Manager(manager_stats(&*db, user.id, now).await?),
        Role::Installer => RoleStats::Installer(installer_stats(&*db, user.id, now).await?),
    };
    Ok(Json(ApiResponse::success(DashboardStats { role: user.role, stats })))
}

/// Order count and Σ total_cost per month, oldest first, zero-filled
pub fn orders_by_month(orders: &[order::Model], now: DateTime<Utc>, months: u32) -> Vec<MonthOrders> {
    let today = now.date_naive();
    let mut buckets: BTreeMap<String, (u64, Decimal)> = (0..months)
        .map(|back| (month_key(month_start_back(today, back)), (0, Decimal::ZERO)))
        .collect();

    for order in orders {
        if let Some((count, revenue)) = buckets.get_mut(&month_key(order.created_at.date_naive())) {
            *count += 1;
            *revenue += order.total_cost;
        }
    }

    buckets
        .into_iter()
        .map(|(month, (count, revenue))| MonthOrders { month, count, revenue })
        .collect()
}

/// Managers ranked by revenue from completed orders
pub fn top_managers(completed: &[order::Model], names: &HashMap<i64, String>, limit: usize) -> Vec<TopManager> {
    let mut totals: BTreeMap<i64, (u64, Decimal)> = BTreeMap::new();
    for order in completed {
        let entry = totals.entry(order.manager_id).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += order.total_cost;
    }

    let mut ranked: Vec<TopManager> = totals
        .into_iter()
        .map(|(manager_id, (orders_count, revenue))| TopManager {
            manager_id,
            full_name: names.get(&manager_id).cloned().unwrap_or_default(),
            orders_count,
            revenue,
        })
        .collect();
    ranked.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.manager_id.cmp(&b.manager_id)));
    ranked.truncate(limit);
    ranked
}

/// GET /api/analytics
pub async fn analytics(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Analytics>>> {
    state.perm.require(&user, res::FINANCE, action::READ).await?;

    let now = Utc::now();
    let since = start_of_day(month_start_back(now.date_naive(), ANALYTICS_MONTHS - 1));
    let recent_months = order::Entity::find()
        .filter(order::Column::CreatedAt.gte(since))
        .all(&*db)
        .await?;

    let mut by_source: BTreeMap<String, (ClientSource, u64)> = BTreeMap::new();
    for c in client::Entity::find().all(&*db).await? {
        by_source
            .entry(c.source.display_name().to_string())
            .or_insert((c.source, 0))
            .1 += 1;
    }
    let clients_by_source = by_source
        .into_iter()
        .map(|(source_display, (source, count))| SourceCount {
            source,
            source_display,
            count,
        })
        .collect();

    let completed = order::Entity::find()
        .filter(order::Column::Status.eq(OrderStatus::Completed))
        .all(&*db)
        .await?;
    let names: HashMap<i64, String> = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Manager))
        .all(&*db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.full_name()))
        .collect();

    let recent = order::Entity::find()
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .limit(RECENT_ORDERS)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(Analytics {
        orders_by_month: orders_by_month(&recent_months, now, ANALYTICS_MONTHS),
        clients_by_source,
        top_managers: top_managers(&completed, &names, TOP_MANAGERS),
        recent_orders: summaries(&*db, recent).await?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::entity::service::ServiceCategory;
    use crate::error::AppError;
    use crate::finance::ledger::record_order_completion;
    use crate::handlers::test_support::{as_user, conn, state};
    use crate::salary::service::tests::{d, jan_at, make_completed_order, make_service, make_user};
    use chrono::TimeZone;

    fn order_at(id: i64, manager_id: i64, total: &str, at: DateTime<Utc>) -> order::Model {
        order::Model {
            id,
            client_id: 1,
            manager_id,
            status: OrderStatus::Completed,
            total_cost: d(total),
            created_at: at,
            completed_at: Some(at),
        }
    }

    #[test]
    fn test_orders_by_month_zero_fills() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let orders = vec![
            order_at(1, 1, "100", Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
            order_at(2, 1, "50", Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap()),
            order_at(3, 1, "70", Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap()),
        ];

        let months = orders_by_month(&orders, now, 6);

        assert_eq!(months.len(), 6);
        assert_eq!(months[0].month, "2023-10");
        assert_eq!(months[5], MonthOrders { month: "2024-03".to_string(), count: 2, revenue: d("150") });
        assert_eq!(months[3].count, 1);
        assert_eq!(months[4].count, 0);
    }

    #[test]
    fn test_top_managers_ranked_by_revenue() {
        let at = jan_at(5);
        let orders = vec![
            order_at(1, 10, "100", at),
            order_at(2, 20, "500", at),
            order_at(3, 10, "300", at),
        ];
        let names = HashMap::from([(10, "Anna".to_string()), (20, "Boris".to_string())]);

        let top = top_managers(&orders, &names, 1);

        assert_eq!(top.len(), 1);
        assert_eq!(top[0].full_name, "Boris");
        assert_eq!(top[0].revenue, d("500"));
    }

    #[tokio::test]
    async fn test_owner_dashboard() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let cond = make_service(&db, ServiceCategory::Conditioner, "30000", "40000").await;
        let order = make_completed_order(&db, manager.id, &[], &[(&cond, manager.id, "40000")], Utc::now()).await;
        record_order_completion(&db, &order).await.unwrap();
        make_completed_order(&db, manager.id, &[], &[], jan_at(4)).await;

        let Json(resp) = dashboard_stats(state(&db).await, conn(&db), as_user(&owner)).await.unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.role, Role::Owner);
        match data.stats {
            RoleStats::Owner(stats) => {
                assert_eq!(stats.orders.total_orders, 2);
                assert_eq!(stats.orders.completed_orders, 2);
                assert_eq!(stats.orders.orders_this_month, 1);
                assert_eq!(stats.total_clients, 2);
                assert_eq!(stats.company_balance, d("10000"));
                assert_eq!(stats.income_this_month, d("40000"));
                assert_eq!(stats.expenses_this_month, d("30000"));
            }
            other => panic!("unexpected stats: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manager_and_installer_dashboards() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let other = make_user(&db, "other", Role::Manager).await;
        let installer = make_user(&db, "installer", Role::Installer).await;
        let cond = make_service(&db, ServiceCategory::Conditioner, "30000", "40000").await;
        make_completed_order(&db, manager.id, &[installer.id], &[(&cond, manager.id, "40000")], Utc::now()).await;
        make_completed_order(&db, manager.id, &[], &[], jan_at(4)).await;
        make_completed_order(&db, other.id, &[], &[], jan_at(4)).await;

        let Json(resp) = dashboard_stats(state(&db).await, conn(&db), as_user(&manager)).await.unwrap();
        match resp.data.unwrap().stats {
            RoleStats::Manager(stats) => {
                assert_eq!(stats.orders.total_orders, 2);
                assert_eq!(stats.total_revenue, d("40000"));
                assert_eq!(stats.revenue_this_month, d("40000"));
                assert_eq!(stats.manager_clients, 2);
                // 30000 fixed + 250 per order + 20% of 10000 profit
                assert_eq!(stats.salary_this_month, d("32250"));
            }
            other => panic!("unexpected stats: {:?}", other),
        }

        let Json(resp) = dashboard_stats(state(&db).await, conn(&db), as_user(&installer)).await.unwrap();
        match resp.data.unwrap().stats {
            RoleStats::Installer(stats) => {
                assert_eq!(stats.orders.total_orders, 1);
                assert_eq!(stats.orders.completed_orders, 1);
                assert_eq!(stats.orders.in_progress_orders, 0);
                assert_eq!(stats.salary_this_month, d("1500"));
            }
            other => panic!("unexpected stats: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_analytics_is_owner_only() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        make_completed_order(&db, manager.id, &[], &[], Utc::now()).await;

        let Json(resp) = analytics(state(&db).await, conn(&db), as_user(&owner)).await.unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.orders_by_month.len(), 6);
        assert_eq!(data.orders_by_month[5].count, 1);
        assert_eq!(data.clients_by_source.len(), 1);
        assert_eq!(data.clients_by_source[0].source, ClientSource::Website);
        assert_eq!(data.top_managers[0].full_name, manager.full_name());
        assert_eq!(data.recent_orders.len(), 1);

        let err = analytics(state(&db).await, conn(&db), as_user(&manager)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }
}
