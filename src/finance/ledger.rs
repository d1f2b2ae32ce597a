use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};

use crate::entity::transaction::TransactionType;
use crate::entity::{order, order_item, salary_payment, service, transaction, user};
use crate::error::{AppError, AppResult};

/// Σ income − Σ expense
pub fn balance(rows: &[transaction::Model]) -> Decimal {
    rows.iter().fold(Decimal::ZERO, |acc, t| match t.kind {
        TransactionType::Income => acc + t.amount,
        TransactionType::Expense => acc - t.amount,
    })
}

pub async fn company_balance<C: ConnectionTrait>(db: &C) -> Result<Decimal, DbErr> {
    let rows = transaction::Entity::find().all(db).await?;
    Ok(balance(&rows))
}

/// Recompute `total_cost` from the order's items and store it
pub async fn recalculate_order_total<C: ConnectionTrait>(
    db: &C,
    order_id: i64,
) -> Result<Decimal, DbErr> {
    let total: Decimal = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(db)
        .await?
        .iter()
        .map(|i| i.price)
        .sum();

    if let Some(existing) = order::Entity::find_by_id(order_id).one(db).await? {
        let mut active: order::ActiveModel = existing.into();
        active.total_cost = Set(total);
        active.update(db).await?;
    }
    Ok(total)
}

/// Book the income and the cost of a completed order.
///
/// Returns false when the order already has ledger entries, so completing
/// an order twice never books it twice.
pub async fn record_order_completion<C: ConnectionTrait>(
    db: &C,
    order: &order::Model,
) -> Result<bool, DbErr> {
    let already = transaction::Entity::find()
        .filter(transaction::Column::OrderId.eq(order.id))
        .count(db)
        .await?;
    if already > 0 {
        return Ok(false);
    }

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .find_also_related(service::Entity)
        .all(db)
        .await?;
    let cost: Decimal = items
        .iter()
        .filter_map(|(_, service)| service.as_ref().map(|s| s.cost_price))
        .sum();

    let now = Utc::now();
    if order.total_cost > Decimal::ZERO {
        transaction::ActiveModel {
            kind: Set(TransactionType::Income),
            amount: Set(order.total_cost),
            description: Set(format!("Income from order #{}", order.id)),
            order_id: Set(Some(order.id)),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    if cost > Decimal::ZERO {
        transaction::ActiveModel {
            kind: Set(TransactionType::Expense),
            amount: Set(cost),
            description: Set(format!("Cost of materials for order #{}", order.id)),
            order_id: Set(Some(order.id)),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    tracing::info!(
        "Order #{} booked: income {}, expense {}",
        order.id,
        order.total_cost,
        cost
    );
    Ok(true)
}

/// Record a payout and the matching expense in one transaction
pub async fn record_salary_payment(
    db: &DatabaseConnection,
    employee: &user::Model,
    amount: Decimal,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> AppResult<salary_payment::Model> {
    if amount < Decimal::ZERO {
        return Err(AppError::Validation("amount must not be negative".to_string()));
    }
    if period_start > period_end {
        return Err(AppError::Validation(
            "period_start must not be after period_end".to_string(),
        ));
    }

    let txn = db.begin().await?;
    let now = Utc::now();
    let payment = salary_payment::ActiveModel {
        user_id: Set(employee.id),
        amount: Set(amount),
        period_start: Set(period_start),
        period_end: Set(period_end),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    transaction::ActiveModel {
        kind: Set(TransactionType::Expense),
        amount: Set(amount),
        description: Set(format!(
            "Salary payment for {} for period {} - {}",
            employee.full_name(),
            period_start,
            period_end
        )),
        order_id: Set(None),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!("Salary payment {} recorded for {}", amount, employee.username);
    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::entity::service::ServiceCategory;
    use crate::entity::user::Role;
    use crate::salary::service::tests::{d, jan_at, make_completed_order, make_service, make_user};

    fn tx(kind: TransactionType, amount: &str) -> transaction::Model {
        transaction::Model {
            id: 0,
            kind,
            amount: d(amount),
            description: String::new(),
            order_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_balance() {
        assert_eq!(balance(&[]), Decimal::ZERO);
        let rows = vec![
            tx(TransactionType::Income, "1000"),
            tx(TransactionType::Expense, "250.50"),
            tx(TransactionType::Income, "10"),
        ];
        assert_eq!(balance(&rows), d("759.50"));
    }

    #[tokio::test]
    async fn test_completion_is_booked_once() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let cond = make_service(&db, ServiceCategory::Conditioner, "30000", "40000").await;
        let extra = make_service(&db, ServiceCategory::Additional, "500", "2000").await;
        let order = make_completed_order(
            &db,
            manager.id,
            &[],
            &[(&cond, manager.id, "40000"), (&extra, manager.id, "2000")],
            jan_at(3),
        )
        .await;

        assert!(record_order_completion(&db, &order).await.unwrap());
        assert!(!record_order_completion(&db, &order).await.unwrap());

        let rows = transaction::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(company_balance(&db).await.unwrap(), d("11500"));
    }

    #[tokio::test]
    async fn test_empty_order_books_nothing() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let order = make_completed_order(&db, manager.id, &[], &[], jan_at(3)).await;

        record_order_completion(&db, &order).await.unwrap();

        assert!(transaction::Entity::find().all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recalculate_total() {
        let db = test_db().await;
        let manager = make_user(&db, "manager", Role::Manager).await;
        let cond = make_service(&db, ServiceCategory::Conditioner, "30000", "40000").await;
        let order = make_completed_order(&db, manager.id, &[], &[(&cond, manager.id, "35000")], jan_at(3)).await;

        order_item::Entity::delete_many().exec(&db).await.unwrap();
        assert_eq!(recalculate_order_total(&db, order.id).await.unwrap(), Decimal::ZERO);

        let stored = order::Entity::find_by_id(order.id).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.total_cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_salary_payment_books_expense() {
        let db = test_db().await;
        let installer = make_user(&db, "petrov", Role::Installer).await;
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

        record_salary_payment(&db, &installer, d("25000"), start, end).await.unwrap();

        let rows = transaction::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, TransactionType::Expense);
        assert_eq!(
            rows[0].description,
            "Salary payment for petrov for period 2024-01-01 - 2024-01-31"
        );
        assert_eq!(company_balance(&db).await.unwrap(), d("-25000"));
    }

    #[tokio::test]
    async fn test_salary_payment_validates_period() {
        let db = test_db().await;
        let installer = make_user(&db, "petrov", Role::Installer).await;
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

        let err = record_salary_payment(&db, &installer, d("100"), start, end).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(salary_payment::Entity::find().all(&db).await.unwrap().is_empty());
    }
}
