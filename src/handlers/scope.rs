//! Row-level visibility per role
//!
//! Objects outside the caller's scope are reported as not found.

use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter};
use std::collections::BTreeSet;

use crate::entity::user::Role;
use crate::entity::{order, order_installer, user};
use crate::error::{AppResult, OptionExt};
use crate::middleware::CurrentUser;

/// Ids of the orders an installer is assigned to
pub async fn assigned_order_ids<C: ConnectionTrait>(db: &C, installer_id: i64) -> AppResult<Vec<i64>> {
    let ids: BTreeSet<i64> = order_installer::Entity::find()
        .filter(order_installer::Column::UserId.eq(installer_id))
        .all(db)
        .await?
        .into_iter()
        .map(|oi| oi.order_id)
        .collect();
    Ok(ids.into_iter().collect())
}

pub async fn orders<C: ConnectionTrait>(db: &C, user: &CurrentUser) -> AppResult<Condition> {
    Ok(match user.role {
        Role::Owner => Condition::all(),
        Role::Manager => Condition::all().add(order::Column::ManagerId.eq(user.id)),
        Role::Installer => {
            let ids = assigned_order_ids(db, user.id).await?;
            Condition::all().add(order::Column::Id.is_in(ids))
        }
    })
}

pub async fn clients<C: ConnectionTrait>(db: &C, user: &CurrentUser) -> AppResult<Condition> {
    use crate::entity::client;

    if !user.is_installer() {
        return Ok(Condition::all());
    }
    let ids = assigned_order_ids(db, user.id).await?;
    let client_ids: BTreeSet<i64> = order::Entity::find()
        .filter(order::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|o| o.client_id)
        .collect();
    Ok(Condition::all().add(client::Column::Id.is_in(client_ids)))
}

pub fn users(user: &CurrentUser) -> Condition {
    match user.role {
        Role::Owner => Condition::all(),
        Role::Manager => Condition::any()
            .add(user::Column::Role.eq(Role::Installer))
            .add(user::Column::Id.eq(user.id)),
        Role::Installer => Condition::all().add(user::Column::Id.eq(user.id)),
    }
}

/// Fetch an order the caller can see
pub async fn find_order<C: ConnectionTrait>(
    db: &C,
    user: &CurrentUser,
    id: i64,
) -> AppResult<order::Model> {
    order::Entity::find_by_id(id)
        .filter(orders(db, user).await?)
        .one(db)
        .await?
        .ok_or_not_found("order not found")
}
