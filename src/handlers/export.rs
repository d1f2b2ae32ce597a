//! CSV exports of clients, orders and the ledger

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;

use super::order::summaries;
use crate::entity::{client, order, transaction};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::permission::{action, res};
use crate::state::AppState;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Serialize)]
struct ClientRow<'a> {
    id: i64,
    name: &'a str,
    phone: &'a str,
    address: &'a str,
    source: &'a str,
    created_at: String,
}

#[derive(Debug, Serialize)]
struct OrderRow<'a> {
    id: i64,
    client: &'a str,
    manager: &'a str,
    status: &'a str,
    total_cost: Decimal,
    created_at: String,
    completed_at: String,
}

#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    id: i64,
    #[serde(rename = "type")]
    kind: &'a str,
    amount: Decimal,
    description: &'a str,
    order_id: Option<i64>,
    created_at: String,
}

/// Serialize rows into CSV with a header row
pub fn to_csv<T: Serialize>(rows: impl IntoIterator<Item = T>) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("csv export failed: {}", e)))
}

fn attachment(name: &str, body: Vec<u8>) -> Response {
    let filename = format!("{}_{}.csv", name, Utc::now().format("%Y%m%d"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// GET /api/export/clients
pub async fn export_clients(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    state.perm.require(&user, res::EXPORT, action::READ).await?;

    let clients = client::Entity::find()
        .order_by_asc(client::Column::Id)
        .all(&*db)
        .await?;
    let body = to_csv(clients.iter().map(|c| ClientRow {
        id: c.id,
        name: &c.name,
        phone: &c.phone,
        address: &c.address,
        source: c.source.display_name(),
        created_at: c.created_at.format(DATETIME_FORMAT).to_string(),
    }))?;

    tracing::info!("{} exported {} clients", user.username, clients.len());
    Ok(attachment("clients", body))
}

/// GET /api/export/orders; managers export only their own orders
pub async fn export_orders(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    state.perm.require(&user, res::EXPORT, action::READ).await?;

    let mut query = order::Entity::find().order_by_asc(order::Column::Id);
    if user.is_manager() {
        query = query.filter(order::Column::ManagerId.eq(user.id));
    }
    let orders = summaries(&*db, query.all(&*db).await?).await?;

    let body = to_csv(orders.iter().map(|o| OrderRow {
        id: o.order.id,
        client: &o.client_name,
        manager: &o.manager_name,
        status: &o.status_display,
        total_cost: o.order.total_cost,
        created_at: o.order.created_at.format(DATETIME_FORMAT).to_string(),
        completed_at: o
            .order
            .completed_at
            .map(|at| at.format(DATETIME_FORMAT).to_string())
            .unwrap_or_default(),
    }))?;

    tracing::info!("{} exported {} orders", user.username, orders.len());
    Ok(attachment("orders", body))
}

/// GET /api/export/finance
pub async fn export_finance(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    state.perm.require(&user, res::TRANSACTIONS, action::READ).await?;

    let rows = transaction::Entity::find()
        .order_by_asc(transaction::Column::CreatedAt)
        .order_by_asc(transaction::Column::Id)
        .all(&*db)
        .await?;
    let body = to_csv(rows.iter().map(|t| TransactionRow {
        id: t.id,
        kind: t.kind.display_name(),
        amount: t.amount,
        description: &t.description,
        order_id: t.order_id,
        created_at: t.created_at.format(DATETIME_FORMAT).to_string(),
    }))?;

    tracing::info!("{} exported {} transactions", user.username, rows.len());
    Ok(attachment("finance", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::entity::service::ServiceCategory;
    use crate::entity::user::Role;
    use crate::finance::ledger::record_order_completion;
    use crate::handlers::test_support::{as_user, conn, state};
    use crate::salary::service::tests::{jan_at, make_completed_order, make_service, make_user};
    use axum::body::to_bytes;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_to_csv_writes_header() {
        #[derive(Serialize)]
        struct Row {
            a: i32,
            b: &'static str,
        }
        let bytes = to_csv(vec![Row { a: 1, b: "x, y" }]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a,b\n1,\"x, y\"\n");
    }

    #[tokio::test]
    async fn test_export_clients() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        make_completed_order(&db, manager.id, &[], &[], jan_at(2)).await;

        let response = export_clients(state(&db).await, conn(&db), as_user(&manager)).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"clients_"));

        let text = body_text(response).await;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,name,phone,address,source,created_at");
        assert!(lines[1].contains("Client,+70000000000,Main street 1,Website"));
    }

    #[tokio::test]
    async fn test_manager_exports_own_orders() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let other = make_user(&db, "other", Role::Manager).await;
        make_completed_order(&db, manager.id, &[], &[], jan_at(2)).await;
        make_completed_order(&db, other.id, &[], &[], jan_at(3)).await;

        let response = export_orders(state(&db).await, conn(&db), as_user(&manager)).await.unwrap();
        let text = body_text(response).await;
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains(",manager,Completed,"));
    }

    #[tokio::test]
    async fn test_finance_export_is_owner_only() {
        let db = test_db().await;
        let owner = make_user(&db, "owner", Role::Owner).await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let installer = make_user(&db, "installer", Role::Installer).await;
        let cond = make_service(&db, ServiceCategory::Conditioner, "300", "500").await;
        let order = make_completed_order(&db, manager.id, &[], &[(&cond, manager.id, "500")], jan_at(2)).await;
        record_order_completion(&db, &order).await.unwrap();

        let response = export_finance(state(&db).await, conn(&db), as_user(&owner)).await.unwrap();
        let text = body_text(response).await;
        assert_eq!(text.lines().next(), Some("id,type,amount,description,order_id,created_at"));
        assert_eq!(text.lines().count(), 3);

        let err = export_finance(state(&db).await, conn(&db), as_user(&manager)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        let err = export_clients(state(&db).await, conn(&db), as_user(&installer)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }
}
