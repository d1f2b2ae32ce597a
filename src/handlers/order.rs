//! Order handlers
//!
//! Orders, their line items and installers. Completing an order books its
//! income and material cost in the same database transaction as the
//! status change.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::{paginate, parse_choice, scope, search_term, Page};
use crate::entity::order::OrderStatus;
use crate::entity::user::Role;
use crate::entity::{client, order, order_installer, order_item, service, user};
use crate::error::{AppError, AppResult, OptionExt};
use crate::finance::ledger;
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<String>,
    pub manager_id: Option<i64>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub client_id: i64,
    pub manager_id: Option<i64>,
    pub status: Option<String>,
    #[serde(default)]
    pub installer_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub client_id: Option<i64>,
    pub manager_id: Option<i64>,
    pub status: Option<String>,
    pub installer_ids: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub service_id: i64,
    pub price: Option<Decimal>,
    pub seller_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: order::Model,
    pub status_display: String,
    pub client_name: String,
    pub manager_name: String,
}

#[derive(Debug, Serialize)]
pub struct PersonRef {
    pub id: i64,
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: order_item::Model,
    pub service_name: String,
    pub category: Option<service::ServiceCategory>,
    pub cost_price: Decimal,
    pub seller_name: String,
    pub profit: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub summary: OrderSummary,
    pub client: Option<client::Model>,
    pub items: Vec<ItemDetail>,
    pub installers: Vec<PersonRef>,
    pub items_count: usize,
    pub total_profit: Decimal,
}

#[derive(Debug, Serialize)]
pub struct MyOrders {
    pub orders: Vec<OrderSummary>,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
}

async fn user_names<C: ConnectionTrait>(db: &C, ids: BTreeSet<i64>) -> AppResult<HashMap<i64, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.full_name()))
        .collect())
}

pub async fn summaries<C: ConnectionTrait>(db: &C, orders: Vec<order::Model>) -> AppResult<Vec<OrderSummary>> {
    let client_ids: BTreeSet<i64> = orders.iter().map(|o| o.client_id).collect();
    let clients: HashMap<i64, String> = if client_ids.is_empty() {
        HashMap::new()
    } else {
        client::Entity::find()
            .filter(client::Column::Id.is_in(client_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect()
    };
    let managers = user_names(db, orders.iter().map(|o| o.manager_id).collect()).await?;

    Ok(orders
        .into_iter()
        .map(|order| OrderSummary {
            status_display: order.status.display_name().to_string(),
            client_name: clients.get(&order.client_id).cloned().unwrap_or_default(),
            manager_name: managers.get(&order.manager_id).cloned().unwrap_or_default(),
            order,
        })
        .collect())
}

pub async fn order_detail<C: ConnectionTrait>(db: &C, order: order::Model) -> AppResult<OrderDetail> {
    let client = client::Entity::find_by_id(order.client_id).one(db).await?;
    let rows = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .find_also_related(service::Entity)
        .order_by_asc(order_item::Column::Id)
        .all(db)
        .await?;
    let installer_ids: BTreeSet<i64> = order_installer::Entity::find()
        .filter(order_installer::Column::OrderId.eq(order.id))
        .all(db)
        .await?
        .into_iter()
        .map(|oi| oi.user_id)
        .collect();

    let mut people: BTreeSet<i64> = rows.iter().map(|(item, _)| item.seller_id).collect();
    people.extend(installer_ids.iter().copied());
    let names = user_names(db, people).await?;

    let items: Vec<ItemDetail> = rows
        .into_iter()
        .map(|(item, service)| {
            let cost_price = service.as_ref().map(|s| s.cost_price).unwrap_or_default();
            ItemDetail {
                service_name: service.as_ref().map(|s| s.name.clone()).unwrap_or_default(),
                category: service.as_ref().map(|s| s.category),
                cost_price,
                seller_name: names.get(&item.seller_id).cloned().unwrap_or_default(),
                profit: item.price - cost_price,
                item,
            }
        })
        .collect();
    let installers = installer_ids
        .into_iter()
        .map(|id| PersonRef {
            id,
            full_name: names.get(&id).cloned().unwrap_or_default(),
        })
        .collect();
    let total_profit = items.iter().map(|i| i.profit).sum();

    let summary = summaries(db, vec![order]).await?.remove(0);
    Ok(OrderDetail {
        summary,
        client,
        items_count: items.len(),
        items,
        installers,
        total_profit,
    })
}

/// Orders the caller may modify; installers never get here
async fn find_writable_order(
    state: &AppState,
    db: &DbConn,
    user: &CurrentUser,
    id: i64,
) -> AppResult<order::Model> {
    state.perm.require(user, res::ORDERS, action::WRITE).await?;
    scope::find_order(&**db, user, id).await
}

async fn check_user_role<C: ConnectionTrait>(db: &C, id: i64, roles: &[Role], what: &str) -> AppResult<()> {
    let found = user::Entity::find_by_id(id).one(db).await?;
    match found {
        Some(u) if roles.contains(&u.role) => Ok(()),
        _ => Err(AppError::Validation(format!("{} {} is not valid", what, id))),
    }
}

async fn check_client<C: ConnectionTrait>(db: &C, id: i64) -> AppResult<()> {
    client::Entity::find_by_id(id)
        .one(db)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::Validation(format!("client {} does not exist", id)))
}

async fn replace_installers<C: ConnectionTrait>(db: &C, order_id: i64, installer_ids: &[i64]) -> AppResult<()> {
    let unique: BTreeSet<i64> = installer_ids.iter().copied().collect();
    for id in &unique {
        check_user_role(db, *id, &[Role::Installer], "installer").await?;
    }

    order_installer::Entity::delete_many()
        .filter(order_installer::Column::OrderId.eq(order_id))
        .exec(db)
        .await?;
    for user_id in unique {
        order_installer::ActiveModel {
            order_id: Set(order_id),
            user_id: Set(user_id),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// Write the new status; every move into `completed` restamps `completed_at`
/// and books the ledger
async fn apply_status<C: ConnectionTrait>(
    db: &C,
    order: order::Model,
    status: OrderStatus,
) -> AppResult<order::Model> {
    let stamp = status == OrderStatus::Completed && order.status != OrderStatus::Completed;
    let mut active: order::ActiveModel = order.into();
    active.status = Set(status);
    if stamp {
        active.completed_at = Set(Some(Utc::now()));
    }
    let updated = active.update(db).await?;

    if updated.status == OrderStatus::Completed {
        ledger::record_order_completion(db, &updated).await?;
    }
    Ok(updated)
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<OrderQuery>,
) -> AppResult<Json<ApiResponse<Page<OrderSummary>>>> {
    state.perm.require(&user, res::ORDERS, action::READ).await?;

    let mut select = order::Entity::find().filter(scope::orders(&*db, &user).await?);
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = parse_choice("status", status)?;
        select = select.filter(order::Column::Status.eq(status));
    }
    if let Some(manager_id) = query.manager_id {
        select = select.filter(order::Column::ManagerId.eq(manager_id));
    }
    if let Some(term) = search_term(query.search.as_deref()) {
        select = select.join(sea_orm::JoinType::InnerJoin, order::Relation::Client.def()).filter(
            Condition::any()
                .add(client::Column::Name.contains(term))
                .add(client::Column::Phone.contains(term)),
        );
    }
    let select = select
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id);

    let page = paginate(&db, select, query.page, query.page_size).await?;
    let results = summaries(&*db, page.results).await?;
    Ok(Json(ApiResponse::success(Page {
        results,
        total: page.total,
        page: page.page,
        page_size: page.page_size,
    })))
}

/// GET /api/orders/my
pub async fn my_orders(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<MyOrders>>> {
    let orders = order::Entity::find()
        .filter(scope::orders(&*db, &user).await?)
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(&*db)
        .await?;

    let completed = orders.iter().filter(|o| o.status == OrderStatus::Completed).count();
    let in_progress = orders.iter().filter(|o| o.status == OrderStatus::InProgress).count();
    let total = orders.len();
    let orders = summaries(&*db, orders).await?;
    Ok(Json(ApiResponse::success(MyOrders {
        orders,
        total,
        completed,
        in_progress,
    })))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    state.perm.require(&user, res::ORDERS, action::READ).await?;
    let found = scope::find_order(&*db, &user, id).await?;
    Ok(Json(ApiResponse::success(order_detail(&*db, found).await?)))
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    state.perm.require(&user, res::ORDERS, action::WRITE).await?;

    let manager_id = if user.is_manager() {
        user.id
    } else {
        req.manager_id.unwrap_or(user.id)
    };
    let status = match req.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => parse_choice("status", raw)?,
        None => OrderStatus::New,
    };

    let txn = db.begin().await?;
    check_client(&txn, req.client_id).await?;
    check_user_role(&txn, manager_id, &[Role::Manager, Role::Owner], "manager").await?;

    let created = order::ActiveModel {
        client_id: Set(req.client_id),
        manager_id: Set(manager_id),
        status: Set(OrderStatus::New),
        total_cost: Set(Decimal::ZERO),
        created_at: Set(Utc::now()),
        completed_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    replace_installers(&txn, created.id, &req.installer_ids).await?;
    let created = if status == OrderStatus::New {
        created
    } else {
        apply_status(&txn, created, status).await?
    };
    let detail = order_detail(&txn, created).await?;
    txn.commit().await?;

    tracing::info!("Order #{} created by {}", detail.summary.order.id, user.username);
    Ok(Json(ApiResponse::success(detail)))
}

/// PUT /api/orders/:id
pub async fn update_order(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateOrderRequest>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let existing = find_writable_order(&state, &db, &user, id).await?;
    let status = match req.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_choice::<OrderStatus>("status", raw)?),
        None => None,
    };
    if let Some(manager_id) = req.manager_id {
        if !user.is_owner() && manager_id != existing.manager_id {
            return Err(AppError::Forbidden);
        }
    }

    let txn = db.begin().await?;
    let mut active: order::ActiveModel = existing.into();
    if let Some(client_id) = req.client_id {
        check_client(&txn, client_id).await?;
        active.client_id = Set(client_id);
    }
    if let Some(manager_id) = req.manager_id {
        check_user_role(&txn, manager_id, &[Role::Manager, Role::Owner], "manager").await?;
        active.manager_id = Set(manager_id);
    }
    let mut updated = active.update(&txn).await?;
    if let Some(installer_ids) = &req.installer_ids {
        replace_installers(&txn, id, installer_ids).await?;
    }
    if let Some(status) = status {
        updated = apply_status(&txn, updated, status).await?;
    }
    let detail = order_detail(&txn, updated).await?;
    txn.commit().await?;

    tracing::info!("Order #{} updated by {}", id, user.username);
    Ok(Json(ApiResponse::success(detail)))
}

/// DELETE /api/orders/:id
pub async fn delete_order(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let existing = find_writable_order(&state, &db, &user, id).await?;
    order::Entity::delete_by_id(existing.id).exec(&*db).await?;

    tracing::info!("Order #{} deleted by {}", id, user.username);
    Ok(Json(ApiResponse::success_msg("order deleted")))
}

/// POST /api/orders/:id/items
pub async fn add_item(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<AddItemRequest>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let existing = find_writable_order(&state, &db, &user, id).await?;
    let service = service::Entity::find_by_id(req.service_id)
        .one(&*db)
        .await?
        .ok_or_else(|| AppError::Validation(format!("service {} does not exist", req.service_id)))?;
    let price = req.price.unwrap_or(service.selling_price);
    if price < Decimal::ZERO {
        return Err(AppError::Validation("price must not be negative".to_string()));
    }
    let seller_id = req.seller_id.unwrap_or(user.id);

    let txn = db.begin().await?;
    check_user_role(&txn, seller_id, &[Role::Owner, Role::Manager, Role::Installer], "seller").await?;
    order_item::ActiveModel {
        order_id: Set(existing.id),
        service_id: Set(service.id),
        seller_id: Set(seller_id),
        price: Set(price),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    ledger::recalculate_order_total(&txn, existing.id).await?;
    let updated = scope::find_order(&txn, &user, existing.id).await?;
    let detail = order_detail(&txn, updated).await?;
    txn.commit().await?;

    tracing::info!("Item {} added to order #{} by {}", service.name, id, user.username);
    Ok(Json(ApiResponse::success(detail)))
}

/// DELETE /api/orders/:id/items/:item_id
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path((id, item_id)): Path<(i64, i64)>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let existing = find_writable_order(&state, &db, &user, id).await?;
    let item = order_item::Entity::find_by_id(item_id)
        .filter(order_item::Column::OrderId.eq(existing.id))
        .one(&*db)
        .await?
        .ok_or_not_found("order item not found")?;

    let txn = db.begin().await?;
    order_item::Entity::delete_by_id(item.id).exec(&txn).await?;
    ledger::recalculate_order_total(&txn, existing.id).await?;
    let updated = scope::find_order(&txn, &user, existing.id).await?;
    let detail = order_detail(&txn, updated).await?;
    txn.commit().await?;

    tracing::info!("Item {} removed from order #{} by {}", item_id, id, user.username);
    Ok(Json(ApiResponse::success(detail)))
}

/// POST /api/orders/:id/status
pub async fn change_status(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> AppResult<Json<ApiResponse<OrderSummary>>> {
    state.perm.require(&user, res::ORDER_STATUS, action::WRITE).await?;
    let status: OrderStatus = parse_choice("status", &req.status)?;
    let existing = scope::find_order(&*db, &user, id).await?;
    if user.is_installer() && status != OrderStatus::Completed {
        tracing::warn!("Installer {} tried to set order #{} to {:?}", user.username, id, status);
        return Err(AppError::Forbidden);
    }

    let txn = db.begin().await?;
    let updated = apply_status(&txn, existing, status).await?;
    let summary = summaries(&txn, vec![updated]).await?.remove(0);
    txn.commit().await?;

    tracing::info!("Order #{} set to {} by {}", id, summary.status_display, user.username);
    Ok(Json(ApiResponse::success(summary)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::entity::service::ServiceCategory;
    use crate::entity::transaction::{self, TransactionType};
    use crate::handlers::test_support::{as_user, conn, state};
    use crate::salary::service::tests::{d, jan_at, make_completed_order, make_service, make_user};

    async fn make_client(db: &sea_orm::DatabaseConnection) -> client::Model {
        client::ActiveModel {
            name: Set("Sidorov".to_string()),
            address: Set("Lenina 1".to_string()),
            phone: Set("+79990000000".to_string()),
            source: Set(client::ClientSource::Avito),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    fn new_order(client_id: i64, manager_id: Option<i64>, installers: Vec<i64>) -> Json<CreateOrderRequest> {
        Json(CreateOrderRequest {
            client_id,
            manager_id,
            status: None,
            installer_ids: installers,
        })
    }

    #[tokio::test]
    async fn test_manager_is_forced_onto_own_order() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let other = make_user(&db, "other", Role::Manager).await;
        let client = make_client(&db).await;

        let Json(resp) = create_order(state(&db).await, conn(&db), as_user(&manager), new_order(client.id, Some(other.id), vec![]))
            .await
            .unwrap();
        let detail = resp.data.unwrap();
        assert_eq!(detail.summary.order.manager_id, manager.id);
        assert_eq!(detail.summary.order.status, OrderStatus::New);
        assert_eq!(detail.summary.order.total_cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_items_keep_total_in_sync() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let client = make_client(&db).await;
        let cond = make_service(&db, ServiceCategory::Conditioner, "30000", "40000").await;
        let extra = make_service(&db, ServiceCategory::Additional, "500", "2000").await;

        let Json(resp) = create_order(state(&db).await, conn(&db), as_user(&owner), new_order(client.id, Some(manager.id), vec![]))
            .await
            .unwrap();
        let order_id = resp.data.unwrap().summary.order.id;

        let add = |service_id, price: Option<&str>| {
            Json(AddItemRequest {
                service_id,
                price: price.map(d),
                seller_id: None,
            })
        };
        add_item(state(&db).await, conn(&db), as_user(&owner), Path(order_id), add(cond.id, None))
            .await
            .unwrap();
        let Json(resp) = add_item(state(&db).await, conn(&db), as_user(&owner), Path(order_id), add(extra.id, Some("1500")))
            .await
            .unwrap();
        let detail = resp.data.unwrap();
        assert_eq!(detail.summary.order.total_cost, d("41500"));
        assert_eq!(detail.items_count, 2);
        assert_eq!(detail.total_profit, d("11000"));
        assert_eq!(detail.items[0].seller_name, "owner");

        let first_item = detail.items[0].item.id;
        let Json(resp) = remove_item(state(&db).await, conn(&db), as_user(&owner), Path((order_id, first_item)))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().summary.order.total_cost, d("1500"));
    }

    #[tokio::test]
    async fn test_negative_item_price_is_rejected() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let client = make_client(&db).await;
        let extra = make_service(&db, ServiceCategory::Additional, "500", "2000").await;
        let Json(resp) = create_order(state(&db).await, conn(&db), as_user(&manager), new_order(client.id, None, vec![]))
            .await
            .unwrap();
        let order_id = resp.data.unwrap().summary.order.id;

        let req = Json(AddItemRequest {
            service_id: extra.id,
            price: Some(d("-1")),
            seller_id: None,
        });
        let err = add_item(state(&db).await, conn(&db), as_user(&manager), Path(order_id), req)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_completion_books_ledger_once() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let installer = make_user(&db, "installer", Role::Installer).await;
        let client = make_client(&db).await;
        let cond = make_service(&db, ServiceCategory::Conditioner, "30000", "40000").await;

        let Json(resp) = create_order(state(&db).await, conn(&db), as_user(&manager), new_order(client.id, None, vec![installer.id]))
            .await
            .unwrap();
        let order_id = resp.data.unwrap().summary.order.id;
        let item = Json(AddItemRequest {
            service_id: cond.id,
            price: None,
            seller_id: None,
        });
        add_item(state(&db).await, conn(&db), as_user(&manager), Path(order_id), item)
            .await
            .unwrap();

        let to = |s: &str| Json(StatusRequest { status: s.to_string() });

        let err = change_status(state(&db).await, conn(&db), as_user(&installer), Path(order_id), to("in_progress"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let Json(resp) = change_status(state(&db).await, conn(&db), as_user(&installer), Path(order_id), to("completed"))
            .await
            .unwrap();
        let summary = resp.data.unwrap();
        assert_eq!(summary.order.status, OrderStatus::Completed);
        assert!(summary.order.completed_at.is_some());

        change_status(state(&db).await, conn(&db), as_user(&manager), Path(order_id), to("completed"))
            .await
            .unwrap();

        let rows = transaction::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 2);
        let income = rows.iter().find(|t| t.kind == TransactionType::Income).unwrap();
        assert_eq!(income.amount, d("40000"));
        assert_eq!(ledger::company_balance(&db).await.unwrap(), d("10000"));
    }

    #[tokio::test]
    async fn test_recompletion_moves_completed_at() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let order = make_completed_order(&db, manager.id, &[], &[], jan_at(4)).await;
        let to = |s: &str| Json(StatusRequest { status: s.to_string() });

        change_status(state(&db).await, conn(&db), as_user(&manager), Path(order.id), to("in_progress"))
            .await
            .unwrap();
        let Json(resp) = change_status(state(&db).await, conn(&db), as_user(&manager), Path(order.id), to("completed"))
            .await
            .unwrap();
        let restamped = resp.data.unwrap().order.completed_at.unwrap();
        assert!(restamped > jan_at(4));

        let Json(resp) = change_status(state(&db).await, conn(&db), as_user(&manager), Path(order.id), to("completed"))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().order.completed_at, Some(restamped));
    }

    #[tokio::test]
    async fn test_unknown_status_is_bad_request() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let order = make_completed_order(&db, manager.id, &[], &[], jan_at(4)).await;

        let err = change_status(
            state(&db).await,
            conn(&db),
            as_user(&manager),
            Path(order.id),
            Json(StatusRequest { status: "lost".to_string() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_manager_cannot_touch_foreign_order() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let other = make_user(&db, "other", Role::Manager).await;
        let order = make_completed_order(&db, other.id, &[], &[], jan_at(4)).await;

        let err = delete_order(state(&db).await, conn(&db), as_user(&manager), Path(order.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_my_orders_counts() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let installer = make_user(&db, "installer", Role::Installer).await;
        make_completed_order(&db, manager.id, &[installer.id], &[], jan_at(4)).await;
        make_completed_order(&db, manager.id, &[], &[], jan_at(5)).await;

        let Json(resp) = my_orders(conn(&db), as_user(&installer)).await.unwrap();
        let mine = resp.data.unwrap();
        assert_eq!(mine.total, 1);
        assert_eq!(mine.completed, 1);
        assert_eq!(mine.in_progress, 0);
    }

    #[tokio::test]
    async fn test_search_by_client_name() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        make_completed_order(&db, manager.id, &[], &[], jan_at(4)).await;

        let query = OrderQuery {
            search: Some("Client".to_string()),
            ..OrderQuery::default()
        };
        let Json(resp) = list_orders(state(&db).await, conn(&db), as_user(&owner), Query(query))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().total, 1);

        let query = OrderQuery {
            search: Some("Nobody".to_string()),
            ..OrderQuery::default()
        };
        let Json(resp) = list_orders(state(&db).await, conn(&db), as_user(&owner), Query(query))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().total, 0);
    }
}
