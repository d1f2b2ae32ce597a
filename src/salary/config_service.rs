//! Salary configuration management
//!
//! A configuration is always written together with its three role
//! sub-configs inside one database transaction.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::rules::{DEFAULT_CONFIG_DESCRIPTION, DEFAULT_CONFIG_NAME};
use super::service::find_default_config;
use crate::entity::{
    installer_salary_config, manager_salary_config, owner_salary_config, salary_config, user,
    user_salary_assignment,
};
use crate::error::{AppError, AppResult, OptionExt};
use crate::money::is_valid_percentage;

/// Parameters of a configuration. On create omitted values take the
/// defaults; on update they keep what is stored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConfigParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,

    pub manager_fixed_salary: Option<Decimal>,
    pub manager_bonus_per_completed_order: Option<Decimal>,
    pub manager_conditioner_profit_percentage: Option<Decimal>,
    pub manager_additional_services_profit_percentage: Option<Decimal>,
    pub manager_installation_profit_percentage: Option<Decimal>,
    pub manager_maintenance_profit_percentage: Option<Decimal>,
    pub manager_dismantling_profit_percentage: Option<Decimal>,

    pub installer_payment_per_installation: Option<Decimal>,
    pub installer_additional_services_profit_percentage: Option<Decimal>,
    pub installer_quality_bonus: Option<Decimal>,
    pub installer_penalty_per_complaint: Option<Decimal>,

    pub owner_payment_per_installation: Option<Decimal>,
    pub owner_remaining_profit_percentage: Option<Decimal>,
}

fn or_default(value: Option<Decimal>, default: i64) -> Decimal {
    value.unwrap_or_else(|| Decimal::from(default))
}

fn check_amount(field: &str, value: Option<Decimal>) -> AppResult<()> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(AppError::Validation(format!(
            "{} must not be negative",
            field
        ))),
        _ => Ok(()),
    }
}

fn check_percentage(field: &str, value: Option<Decimal>) -> AppResult<()> {
    match value {
        Some(v) if !is_valid_percentage(v) => Err(AppError::Validation(format!(
            "{} must be between 0 and 100",
            field
        ))),
        _ => Ok(()),
    }
}

pub fn validate_name(name: &str) -> AppResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if name.chars().count() > 100 {
        return Err(AppError::Validation(
            "name must be at most 100 characters".to_string(),
        ));
    }
    Ok(())
}

impl ConfigParams {
    pub fn validate(&self) -> AppResult<()> {
        validate_name(self.name.as_deref().unwrap_or_default())?;
        self.validate_values()
    }

    /// Range checks only, for partial updates
    pub fn validate_values(&self) -> AppResult<()> {
        check_amount("manager_fixed_salary", self.manager_fixed_salary)?;
        check_amount("manager_bonus_per_completed_order", self.manager_bonus_per_completed_order)?;
        check_percentage("manager_conditioner_profit_percentage", self.manager_conditioner_profit_percentage)?;
        check_percentage(
            "manager_additional_services_profit_percentage",
            self.manager_additional_services_profit_percentage,
        )?;
        check_percentage("manager_installation_profit_percentage", self.manager_installation_profit_percentage)?;
        check_percentage("manager_maintenance_profit_percentage", self.manager_maintenance_profit_percentage)?;
        check_percentage("manager_dismantling_profit_percentage", self.manager_dismantling_profit_percentage)?;
        check_amount("installer_payment_per_installation", self.installer_payment_per_installation)?;
        check_percentage(
            "installer_additional_services_profit_percentage",
            self.installer_additional_services_profit_percentage,
        )?;
        check_amount("installer_quality_bonus", self.installer_quality_bonus)?;
        check_amount("installer_penalty_per_complaint", self.installer_penalty_per_complaint)?;
        check_amount("owner_payment_per_installation", self.owner_payment_per_installation)?;
        check_percentage("owner_remaining_profit_percentage", self.owner_remaining_profit_percentage)?;
        Ok(())
    }

    fn manager_model(&self, config_id: i64) -> manager_salary_config::ActiveModel {
        manager_salary_config::ActiveModel {
            config_id: Set(config_id),
            fixed_salary: Set(or_default(self.manager_fixed_salary, 30000)),
            bonus_per_completed_order: Set(or_default(self.manager_bonus_per_completed_order, 250)),
            conditioner_profit_percentage: Set(or_default(self.manager_conditioner_profit_percentage, 20)),
            additional_services_profit_percentage: Set(or_default(
                self.manager_additional_services_profit_percentage,
                30,
            )),
            installation_profit_percentage: Set(or_default(self.manager_installation_profit_percentage, 15)),
            maintenance_profit_percentage: Set(or_default(self.manager_maintenance_profit_percentage, 25)),
            dismantling_profit_percentage: Set(or_default(self.manager_dismantling_profit_percentage, 20)),
            ..Default::default()
        }
    }

    fn installer_model(&self, config_id: i64) -> installer_salary_config::ActiveModel {
        installer_salary_config::ActiveModel {
            config_id: Set(config_id),
            payment_per_installation: Set(or_default(self.installer_payment_per_installation, 1500)),
            additional_services_profit_percentage: Set(or_default(
                self.installer_additional_services_profit_percentage,
                30,
            )),
            // stored for reference, the formula does not read them
            quality_bonus: Set(or_default(self.installer_quality_bonus, 0)),
            penalty_per_complaint: Set(or_default(self.installer_penalty_per_complaint, 500)),
            ..Default::default()
        }
    }

    fn owner_model(&self, config_id: i64) -> owner_salary_config::ActiveModel {
        owner_salary_config::ActiveModel {
            config_id: Set(config_id),
            payment_per_installation: Set(or_default(self.owner_payment_per_installation, 1500)),
            remaining_profit_percentage: Set(or_default(self.owner_remaining_profit_percentage, 100)),
            ..Default::default()
        }
    }
}

/// A configuration with its sub-configs
#[derive(Clone, Debug, Serialize)]
pub struct ConfigDetail {
    #[serde(flatten)]
    pub config: salary_config::Model,
    pub manager_config: Option<manager_salary_config::Model>,
    pub installer_config: Option<installer_salary_config::Model>,
    pub owner_config: Option<owner_salary_config::Model>,
    pub assignments_count: u64,
}

pub async fn config_detail<C: ConnectionTrait>(
    db: &C,
    config: salary_config::Model,
) -> AppResult<ConfigDetail> {
    let manager_config = manager_salary_config::Entity::find()
        .filter(manager_salary_config::Column::ConfigId.eq(config.id))
        .one(db)
        .await?;
    let installer_config = installer_salary_config::Entity::find()
        .filter(installer_salary_config::Column::ConfigId.eq(config.id))
        .one(db)
        .await?;
    let owner_config = owner_salary_config::Entity::find()
        .filter(owner_salary_config::Column::ConfigId.eq(config.id))
        .one(db)
        .await?;
    let assignments_count = user_salary_assignment::Entity::find()
        .filter(user_salary_assignment::Column::ConfigId.eq(config.id))
        .count(db)
        .await?;

    Ok(ConfigDetail {
        config,
        manager_config,
        installer_config,
        owner_config,
        assignments_count,
    })
}

/// All configurations, newest first
pub async fn list_configs<C: ConnectionTrait>(db: &C) -> AppResult<Vec<salary_config::Model>> {
    Ok(salary_config::Entity::find()
        .order_by_desc(salary_config::Column::CreatedAt)
        .order_by_desc(salary_config::Column::Id)
        .all(db)
        .await?)
}

pub async fn get_config<C: ConnectionTrait>(db: &C, id: i64) -> AppResult<salary_config::Model> {
    salary_config::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_not_found("salary config not found")
}

/// Insert a configuration and all three sub-configs atomically
pub async fn create_config(
    db: &DatabaseConnection,
    params: &ConfigParams,
) -> AppResult<salary_config::Model> {
    params.validate()?;

    let txn = db.begin().await?;
    let now = Utc::now();
    let config = salary_config::ActiveModel {
        name: Set(params.name.as_deref().unwrap_or_default().trim().to_string()),
        description: Set(params.description.clone().unwrap_or_default()),
        is_active: Set(params.is_active.unwrap_or(true)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    params.manager_model(config.id).insert(&txn).await?;
    params.installer_model(config.id).insert(&txn).await?;
    params.owner_model(config.id).insert(&txn).await?;
    txn.commit().await?;

    tracing::info!("Salary config created: {} (id {})", config.name, config.id);
    Ok(config)
}

pub async fn create_default_config(db: &DatabaseConnection) -> AppResult<salary_config::Model> {
    let params = ConfigParams {
        name: Some(DEFAULT_CONFIG_NAME.to_string()),
        description: Some(DEFAULT_CONFIG_DESCRIPTION.to_string()),
        is_active: Some(true),
        ..ConfigParams::default()
    };
    create_config(db, &params).await
}

/// Update the header and every sub-config field present in `params`.
/// Missing sub-configs are created with defaults first.
pub async fn update_config(
    db: &DatabaseConnection,
    id: i64,
    params: &ConfigParams,
) -> AppResult<salary_config::Model> {
    if let Some(name) = &params.name {
        validate_name(name)?;
    }
    params.validate_values()?;

    let txn = db.begin().await?;
    let existing = get_config(&txn, id).await?;

    let mut active: salary_config::ActiveModel = existing.into();
    if let Some(name) = &params.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = &params.description {
        active.description = Set(description.clone());
    }
    if let Some(is_active) = params.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now());
    let config = active.update(&txn).await?;

    let manager = manager_salary_config::Entity::find()
        .filter(manager_salary_config::Column::ConfigId.eq(id))
        .one(&txn)
        .await?;
    match manager {
        Some(m) => {
            let mut m: manager_salary_config::ActiveModel = m.into();
            if let Some(v) = params.manager_fixed_salary {
                m.fixed_salary = Set(v);
            }
            if let Some(v) = params.manager_bonus_per_completed_order {
                m.bonus_per_completed_order = Set(v);
            }
            if let Some(v) = params.manager_conditioner_profit_percentage {
                m.conditioner_profit_percentage = Set(v);
            }
            if let Some(v) = params.manager_additional_services_profit_percentage {
                m.additional_services_profit_percentage = Set(v);
            }
            if let Some(v) = params.manager_installation_profit_percentage {
                m.installation_profit_percentage = Set(v);
            }
            if let Some(v) = params.manager_maintenance_profit_percentage {
                m.maintenance_profit_percentage = Set(v);
            }
            if let Some(v) = params.manager_dismantling_profit_percentage {
                m.dismantling_profit_percentage = Set(v);
            }
            m.update(&txn).await?;
        }
        None => {
            params.manager_model(id).insert(&txn).await?;
        }
    }

    let installer = installer_salary_config::Entity::find()
        .filter(installer_salary_config::Column::ConfigId.eq(id))
        .one(&txn)
        .await?;
    match installer {
        Some(i) => {
            let mut i: installer_salary_config::ActiveModel = i.into();
            if let Some(v) = params.installer_payment_per_installation {
                i.payment_per_installation = Set(v);
            }
            if let Some(v) = params.installer_additional_services_profit_percentage {
                i.additional_services_profit_percentage = Set(v);
            }
            if let Some(v) = params.installer_quality_bonus {
                i.quality_bonus = Set(v);
            }
            if let Some(v) = params.installer_penalty_per_complaint {
                i.penalty_per_complaint = Set(v);
            }
            i.update(&txn).await?;
        }
        None => {
            params.installer_model(id).insert(&txn).await?;
        }
    }

    let owner = owner_salary_config::Entity::find()
        .filter(owner_salary_config::Column::ConfigId.eq(id))
        .one(&txn)
        .await?;
    match owner {
        Some(o) => {
            let mut o: owner_salary_config::ActiveModel = o.into();
            if let Some(v) = params.owner_payment_per_installation {
                o.payment_per_installation = Set(v);
            }
            if let Some(v) = params.owner_remaining_profit_percentage {
                o.remaining_profit_percentage = Set(v);
            }
            o.update(&txn).await?;
        }
        None => {
            params.owner_model(id).insert(&txn).await?;
        }
    }

    txn.commit().await?;
    Ok(config)
}

/// Delete a configuration; sub-configs and assignments go with it
pub async fn delete_config(db: &DatabaseConnection, id: i64) -> AppResult<()> {
    let config = get_config(db, id).await?;

    let txn = db.begin().await?;
    manager_salary_config::Entity::delete_many()
        .filter(manager_salary_config::Column::ConfigId.eq(id))
        .exec(&txn)
        .await?;
    installer_salary_config::Entity::delete_many()
        .filter(installer_salary_config::Column::ConfigId.eq(id))
        .exec(&txn)
        .await?;
    owner_salary_config::Entity::delete_many()
        .filter(owner_salary_config::Column::ConfigId.eq(id))
        .exec(&txn)
        .await?;
    user_salary_assignment::Entity::delete_many()
        .filter(user_salary_assignment::Column::ConfigId.eq(id))
        .exec(&txn)
        .await?;
    salary_config::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!("Salary config deleted: {} (id {})", config.name, id);
    Ok(())
}

pub async fn set_active<C: ConnectionTrait>(
    db: &C,
    id: i64,
    is_active: bool,
) -> AppResult<salary_config::Model> {
    let config = get_config(db, id).await?;
    let mut active: salary_config::ActiveModel = config.into();
    active.is_active = Set(is_active);
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

/// Make `id` the only active configuration
pub async fn activate(db: &DatabaseConnection, id: i64) -> AppResult<salary_config::Model> {
    get_config(db, id).await?;

    let txn = db.begin().await?;
    let others = salary_config::Entity::find()
        .filter(salary_config::Column::Id.ne(id))
        .filter(salary_config::Column::IsActive.eq(true))
        .all(&txn)
        .await?;
    for other in others {
        set_active(&txn, other.id, false).await?;
    }
    let config = set_active(&txn, id, true).await?;
    txn.commit().await?;

    tracing::info!("Salary config activated: {} (id {})", config.name, id);
    Ok(config)
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CopyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub copy_assignments: bool,
}

/// Duplicate a configuration with its sub-configs. With `copy_assignments`
/// the source config's users are moved over to the copy.
pub async fn copy_config(
    db: &DatabaseConnection,
    id: i64,
    req: &CopyRequest,
) -> AppResult<salary_config::Model> {
    let source = config_detail(db, get_config(db, id).await?).await?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} (copy)", source.config.name));
    validate_name(&name)?;

    let mut params = ConfigParams {
        name: Some(name.clone()),
        description: Some(
            req.description
                .clone()
                .unwrap_or_else(|| source.config.description.clone()),
        ),
        is_active: Some(true),
        ..ConfigParams::default()
    };
    if let Some(m) = &source.manager_config {
        params.manager_fixed_salary = Some(m.fixed_salary);
        params.manager_bonus_per_completed_order = Some(m.bonus_per_completed_order);
        params.manager_conditioner_profit_percentage = Some(m.conditioner_profit_percentage);
        params.manager_additional_services_profit_percentage = Some(m.additional_services_profit_percentage);
        params.manager_installation_profit_percentage = Some(m.installation_profit_percentage);
        params.manager_maintenance_profit_percentage = Some(m.maintenance_profit_percentage);
        params.manager_dismantling_profit_percentage = Some(m.dismantling_profit_percentage);
    }
    if let Some(i) = &source.installer_config {
        params.installer_payment_per_installation = Some(i.payment_per_installation);
        params.installer_additional_services_profit_percentage = Some(i.additional_services_profit_percentage);
        params.installer_quality_bonus = Some(i.quality_bonus);
        params.installer_penalty_per_complaint = Some(i.penalty_per_complaint);
    }
    if let Some(o) = &source.owner_config {
        params.owner_payment_per_installation = Some(o.payment_per_installation);
        params.owner_remaining_profit_percentage = Some(o.remaining_profit_percentage);
    }

    let txn = db.begin().await?;
    let now = Utc::now();
    let copy = salary_config::ActiveModel {
        name: Set(name),
        description: Set(params.description.clone().unwrap_or_default()),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    if source.manager_config.is_some() {
        params.manager_model(copy.id).insert(&txn).await?;
    }
    if source.installer_config.is_some() {
        params.installer_model(copy.id).insert(&txn).await?;
    }
    if source.owner_config.is_some() {
        params.owner_model(copy.id).insert(&txn).await?;
    }

    if req.copy_assignments {
        let assignments = user_salary_assignment::Entity::find()
            .filter(user_salary_assignment::Column::ConfigId.eq(id))
            .all(&txn)
            .await?;
        for assignment in assignments {
            let mut active: user_salary_assignment::ActiveModel = assignment.into();
            active.config_id = Set(copy.id);
            active.assigned_at = Set(now);
            active.update(&txn).await?;
        }
    }
    txn.commit().await?;

    tracing::info!("Salary config {} copied to {} (id {})", id, copy.name, copy.id);
    Ok(copy)
}

/// Point the user at `config_id`, replacing any previous assignment
pub async fn assign_config_to_user<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    config_id: i64,
) -> AppResult<user_salary_assignment::Model> {
    let existing = user_salary_assignment::Entity::find()
        .filter(user_salary_assignment::Column::UserId.eq(user_id))
        .one(db)
        .await?;

    let assignment = match existing {
        Some(existing) => {
            let mut active: user_salary_assignment::ActiveModel = existing.into();
            active.config_id = Set(config_id);
            active.assigned_at = Set(Utc::now());
            active.update(db).await?
        }
        None => {
            user_salary_assignment::ActiveModel {
                user_id: Set(user_id),
                config_id: Set(config_id),
                assigned_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };
    Ok(assignment)
}

/// Checked assignment: the user must exist and the config must be active
pub async fn assign_checked<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    config_id: i64,
) -> AppResult<user_salary_assignment::Model> {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_not_found("user not found")?;
    let config = get_config(db, config_id).await?;
    if !config.is_active {
        return Err(AppError::Validation(
            "only an active salary config can be assigned".to_string(),
        ));
    }
    assign_config_to_user(db, user_id, config_id).await
}

/// Upsert the same config for many users, returns how many were written
pub async fn bulk_assign(
    db: &DatabaseConnection,
    config_id: i64,
    user_ids: &[i64],
) -> AppResult<u64> {
    let txn = db.begin().await?;
    let mut count = 0;
    let unique: HashSet<i64> = user_ids.iter().copied().collect();
    for user_id in unique {
        assign_checked(&txn, user_id, config_id).await?;
        count += 1;
    }
    txn.commit().await?;
    Ok(count)
}

/// Employees without an assignment
pub async fn users_without_config<C: ConnectionTrait>(db: &C) -> AppResult<Vec<user::Model>> {
    let assigned: HashSet<i64> = user_salary_assignment::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|a| a.user_id)
        .collect();

    let users = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(db)
        .await?;
    Ok(users
        .into_iter()
        .filter(|u| !assigned.contains(&u.id))
        .collect())
}

/// Give every unassigned employee the default config, creating it when
/// missing. Returns the number of new assignments.
pub async fn bulk_assign_default_config(db: &DatabaseConnection) -> AppResult<u64> {
    let config = match find_default_config(db).await? {
        Some(config) => config,
        None => create_default_config(db).await?,
    };

    let users = users_without_config(db).await?;
    let txn = db.begin().await?;
    for user in &users {
        assign_config_to_user(&txn, user.id, config.id).await?;
    }
    txn.commit().await?;

    tracing::info!("Assigned config {} to {} users", config.name, users.len());
    Ok(users.len() as u64)
}
