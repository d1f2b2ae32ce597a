//! Salary calculation against the database
//!
//! Loads completed orders, their items and the user's adjustments for a
//! period, resolves which rules apply and hands everything to the engine.

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashSet;

use super::engine::{self, AdjustmentLine, OwnerSalary, SalaryReport, SoldItem};
use super::period::SalaryPeriod;
use super::rules::{
    InstallerRates, ManagerRates, OwnerRates, RuleSet, DEFAULT_CONFIG_MARKER,
};
use crate::entity::order::OrderStatus;
use crate::entity::user::Role;
use crate::entity::{
    installer_salary_config, manager_salary_config, order, order_installer, order_item,
    owner_salary_config, salary_adjustment, salary_config, service, user, user_salary_assignment,
};

/// Config a user is paid by: their own assignment when its config is
/// active, otherwise the newest active config named like "default".
pub async fn resolve_user_config<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<Option<salary_config::Model>, DbErr> {
    let assignment = user_salary_assignment::Entity::find()
        .filter(user_salary_assignment::Column::UserId.eq(user_id))
        .one(db)
        .await?;

    if let Some(assignment) = assignment {
        let config = salary_config::Entity::find_by_id(assignment.config_id)
            .one(db)
            .await?;
        if let Some(config) = config.filter(|c| c.is_active) {
            return Ok(Some(config));
        }
    }

    find_default_config(db).await
}

/// Newest active config whose name contains "default", ignoring case
pub async fn find_default_config<C: ConnectionTrait>(
    db: &C,
) -> Result<Option<salary_config::Model>, DbErr> {
    let configs = active_configs(db).await?;
    Ok(configs
        .into_iter()
        .find(|c| c.name.to_lowercase().contains(DEFAULT_CONFIG_MARKER)))
}

async fn active_configs<C: ConnectionTrait>(db: &C) -> Result<Vec<salary_config::Model>, DbErr> {
    salary_config::Entity::find()
        .filter(salary_config::Column::IsActive.eq(true))
        .order_by_desc(salary_config::Column::CreatedAt)
        .order_by_desc(salary_config::Column::Id)
        .all(db)
        .await
}

pub async fn installer_rules<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<RuleSet<InstallerRates>, DbErr> {
    let Some(config) = resolve_user_config(db, user_id).await? else {
        return Ok(RuleSet::Legacy);
    };
    let sub = installer_salary_config::Entity::find()
        .filter(installer_salary_config::Column::ConfigId.eq(config.id))
        .one(db)
        .await?;
    Ok(match sub {
        Some(sub) => RuleSet::configured(config.name, InstallerRates::from(&sub)),
        None => RuleSet::Legacy,
    })
}

pub async fn manager_rules<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<RuleSet<ManagerRates>, DbErr> {
    let Some(config) = resolve_user_config(db, user_id).await? else {
        return Ok(RuleSet::Legacy);
    };
    let sub = manager_salary_config::Entity::find()
        .filter(manager_salary_config::Column::ConfigId.eq(config.id))
        .one(db)
        .await?;
    Ok(match sub {
        Some(sub) => RuleSet::configured(config.name, ManagerRates::from(&sub)),
        None => RuleSet::Legacy,
    })
}

/// The owner is not paid by assignment: the newest active config that
/// carries owner parameters wins.
pub async fn owner_rules<C: ConnectionTrait>(db: &C) -> Result<RuleSet<OwnerRates>, DbErr> {
    let configs = active_configs(db).await?;
    if configs.is_empty() {
        return Ok(RuleSet::Legacy);
    }
    let ids: Vec<i64> = configs.iter().map(|c| c.id).collect();
    let subs = owner_salary_config::Entity::find()
        .filter(owner_salary_config::Column::ConfigId.is_in(ids))
        .all(db)
        .await?;

    for config in configs {
        if let Some(sub) = subs.iter().find(|s| s.config_id == config.id) {
            return Ok(RuleSet::configured(config.name, OwnerRates::from(sub)));
        }
    }
    Ok(RuleSet::Legacy)
}

fn completed_in(period: &SalaryPeriod) -> sea_orm::Condition {
    sea_orm::Condition::all()
        .add(order::Column::Status.eq(OrderStatus::Completed))
        .add(order::Column::CompletedAt.gte(period.start))
        .add(order::Column::CompletedAt.lte(period.end))
}

/// Ids of completed orders in the period the installer worked on
pub async fn installer_completed_orders<C: ConnectionTrait>(
    db: &C,
    installer_id: i64,
    period: &SalaryPeriod,
) -> Result<Vec<i64>, DbErr> {
    let assigned: Vec<i64> = order_installer::Entity::find()
        .filter(order_installer::Column::UserId.eq(installer_id))
        .all(db)
        .await?
        .into_iter()
        .map(|oi| oi.order_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if assigned.is_empty() {
        return Ok(Vec::new());
    }

    let orders = order::Entity::find()
        .filter(order::Column::Id.is_in(assigned))
        .filter(completed_in(period))
        .all(db)
        .await?;
    Ok(orders.into_iter().map(|o| o.id).collect())
}

/// Ids of completed orders in the period, optionally of one manager
pub async fn completed_orders<C: ConnectionTrait>(
    db: &C,
    manager_id: Option<i64>,
    period: &SalaryPeriod,
) -> Result<Vec<i64>, DbErr> {
    let mut query = order::Entity::find().filter(completed_in(period));
    if let Some(manager_id) = manager_id {
        query = query.filter(order::Column::ManagerId.eq(manager_id));
    }
    let orders = query.all(db).await?;
    Ok(orders.into_iter().map(|o| o.id).collect())
}

/// Items of the given orders joined with their service
pub async fn sold_items<C: ConnectionTrait>(
    db: &C,
    order_ids: &[i64],
) -> Result<Vec<SoldItem>, DbErr> {
    if order_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(order_ids.to_vec()))
        .find_also_related(service::Entity)
        .order_by_asc(order_item::Column::Id)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, service)| {
            service.map(|service| SoldItem {
                order_id: item.order_id,
                seller_id: item.seller_id,
                category: service.category,
                price: item.price,
                cost_price: service.cost_price,
            })
        })
        .collect())
}

/// Adjustments of the user whose period touches `period`
pub async fn adjustments_in_period<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    period: &SalaryPeriod,
) -> Result<Vec<AdjustmentLine>, DbErr> {
    let rows = salary_adjustment::Entity::find()
        .filter(salary_adjustment::Column::UserId.eq(user_id))
        .filter(salary_adjustment::Column::PeriodStart.lte(period.end_date()))
        .filter(salary_adjustment::Column::PeriodEnd.gte(period.start_date()))
        .order_by_asc(salary_adjustment::Column::Id)
        .all(db)
        .await?;
    Ok(rows.iter().map(AdjustmentLine::from).collect())
}

pub async fn calculate_installer<C: ConnectionTrait>(
    db: &C,
    installer: &user::Model,
    period: &SalaryPeriod,
) -> Result<SalaryReport, DbErr> {
    let rules = installer_rules(db, installer.id).await?;
    let orders = installer_completed_orders(db, installer.id, period).await?;
    let items = sold_items(db, &orders).await?;
    let adjustments = adjustments_in_period(db, installer.id, period).await?;

    Ok(SalaryReport::Installer(engine::installer_salary(
        &rules,
        installer.id,
        orders.len() as u64,
        &items,
        &adjustments,
        period,
    )))
}

pub async fn calculate_manager<C: ConnectionTrait>(
    db: &C,
    manager: &user::Model,
    period: &SalaryPeriod,
) -> Result<SalaryReport, DbErr> {
    let rules = manager_rules(db, manager.id).await?;
    let orders = completed_orders(db, Some(manager.id), period).await?;
    let items = sold_items(db, &orders).await?;
    let adjustments = adjustments_in_period(db, manager.id, period).await?;

    Ok(SalaryReport::Manager(engine::manager_salary(
        &rules,
        manager.id,
        orders.len() as u64,
        &items,
        &adjustments,
        period,
    )))
}

/// Owner calculation; adjustments are taken from the first owner account
pub async fn calculate_owner<C: ConnectionTrait>(
    db: &C,
    period: &SalaryPeriod,
) -> Result<OwnerSalary, DbErr> {
    let rules = owner_rules(db).await?;
    let orders = completed_orders(db, None, period).await?;
    let items = sold_items(db, &orders).await?;

    let managers_count = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Manager))
        .all(db)
        .await?
        .len() as u64;

    let owner = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Owner))
        .order_by_asc(user::Column::Id)
        .one(db)
        .await?;
    let adjustments = match owner {
        Some(owner) => adjustments_in_period(db, owner.id, period).await?,
        None => Vec::new(),
    };

    Ok(engine::owner_salary(
        &rules,
        orders.len() as u64,
        &items,
        managers_count,
        &adjustments,
        period,
    ))
}

/// Dispatch on the user's role
pub async fn calculate_for_user<C: ConnectionTrait>(
    db: &C,
    user: &user::Model,
    period: &SalaryPeriod,
) -> Result<SalaryReport, DbErr> {
    match user.role {
        Role::Installer => calculate_installer(db, user, period).await,
        Role::Manager => calculate_manager(db, user, period).await,
        Role::Owner => Ok(SalaryReport::Owner(calculate_owner(db, period).await?)),
    }
}
