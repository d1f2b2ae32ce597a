//! Permission module using Casbin
//!
//! Role based access: every policy is `(role, resource, action)`. Row-level
//! scoping (a manager only sees their own orders and so on) is applied by
//! the handlers on top of these checks.

use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::entity::user::Role;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;

/// Resource constants
pub mod res {
    pub const USERS: &str = "users";
    pub const CLIENTS: &str = "clients";
    pub const SERVICES: &str = "services";
    pub const ORDERS: &str = "orders";
    pub const ORDER_STATUS: &str = "order_status";
    pub const TRANSACTIONS: &str = "transactions";
    pub const FINANCE: &str = "finance";
    pub const SALARY_PAYMENTS: &str = "salary_payments";
    pub const SALARY_CONFIGS: &str = "salary_configs";
    pub const SALARY: &str = "salary";
    pub const DASHBOARD: &str = "dashboard";
    pub const EXPORT: &str = "export";
}

/// Action constants
pub mod action {
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
}

const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

use action::{READ, WRITE};

/// The role policy table
pub const POLICIES: &[(&str, &str, &str)] = &[
    ("owner", res::USERS, READ),
    ("owner", res::USERS, WRITE),
    ("owner", res::CLIENTS, READ),
    ("owner", res::CLIENTS, WRITE),
    ("owner", res::SERVICES, READ),
    ("owner", res::SERVICES, WRITE),
    ("owner", res::ORDERS, READ),
    ("owner", res::ORDERS, WRITE),
    ("owner", res::ORDER_STATUS, WRITE),
    ("owner", res::TRANSACTIONS, READ),
    ("owner", res::TRANSACTIONS, WRITE),
    ("owner", res::FINANCE, READ),
    ("owner", res::SALARY_PAYMENTS, READ),
    ("owner", res::SALARY_PAYMENTS, WRITE),
    ("owner", res::SALARY_CONFIGS, READ),
    ("owner", res::SALARY_CONFIGS, WRITE),
    ("owner", res::SALARY, READ),
    ("owner", res::DASHBOARD, READ),
    ("owner", res::EXPORT, READ),
    ("manager", res::USERS, READ),
    ("manager", res::CLIENTS, READ),
    ("manager", res::CLIENTS, WRITE),
    ("manager", res::SERVICES, READ),
    ("manager", res::ORDERS, READ),
    ("manager", res::ORDERS, WRITE),
    ("manager", res::ORDER_STATUS, WRITE),
    ("manager", res::SALARY_PAYMENTS, READ),
    ("manager", res::DASHBOARD, READ),
    ("manager", res::EXPORT, READ),
    ("installer", res::USERS, READ),
    ("installer", res::CLIENTS, READ),
    ("installer", res::SERVICES, READ),
    ("installer", res::ORDERS, READ),
    ("installer", res::ORDER_STATUS, WRITE),
    ("installer", res::SALARY_PAYMENTS, READ),
    ("installer", res::DASHBOARD, READ),
];

/// Permission enforcer wrapper
#[derive(Clone)]
pub struct PermissionEnforcer {
    enforcer: Arc<RwLock<Enforcer>>,
}

impl PermissionEnforcer {
    /// Build the enforcer from the embedded model and role policies
    pub async fn new() -> anyhow::Result<Self> {
        let model = DefaultModel::from_str(MODEL).await?;
        let mut enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;

        let rules: Vec<Vec<String>> = POLICIES
            .iter()
            .map(|(role, obj, act)| vec![role.to_string(), obj.to_string(), act.to_string()])
            .collect();
        enforcer.add_policies(rules).await?;

        Ok(Self {
            enforcer: Arc::new(RwLock::new(enforcer)),
        })
    }

    /// Check if role has permission
    pub async fn check(&self, role: Role, obj: &str, act: &str) -> bool {
        let enforcer = self.enforcer.read().await;
        enforcer.enforce((role.as_str(), obj, act)).unwrap_or(false)
    }

    /// Forbidden unless the user's role grants `act` on `obj`
    pub async fn require(&self, user: &CurrentUser, obj: &str, act: &str) -> AppResult<()> {
        if self.check(user.role, obj, act).await {
            Ok(())
        } else {
            tracing::warn!(
                "Permission denied: {} ({}) {} {}",
                user.username,
                user.role.as_str(),
                act,
                obj
            );
            Err(AppError::Forbidden)
        }
    }

    /// Resources a role can read, for the current-user endpoint
    pub async fn readable(&self, role: Role) -> Vec<String> {
        let mut resources = Vec::new();
        for (r, obj, act) in POLICIES {
            if *r == role.as_str() && *act == READ && self.check(role, obj, READ).await {
                resources.push(obj.to_string());
            }
        }
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer() -> PermissionEnforcer {
        tokio_test::block_on(PermissionEnforcer::new()).unwrap()
    }

    #[test]
    fn test_owner_policies() {
        let perm = enforcer();
        tokio_test::block_on(async {
            assert!(perm.check(Role::Owner, res::SALARY_CONFIGS, WRITE).await);
            assert!(perm.check(Role::Owner, res::TRANSACTIONS, READ).await);
            assert!(perm.check(Role::Owner, res::SERVICES, WRITE).await);
        });
    }

    #[test]
    fn test_manager_policies() {
        let perm = enforcer();
        tokio_test::block_on(async {
            assert!(perm.check(Role::Manager, res::ORDERS, WRITE).await);
            assert!(perm.check(Role::Manager, res::CLIENTS, WRITE).await);
            assert!(!perm.check(Role::Manager, res::SERVICES, WRITE).await);
            assert!(!perm.check(Role::Manager, res::TRANSACTIONS, READ).await);
            assert!(!perm.check(Role::Manager, res::SALARY, READ).await);
        });
    }

    #[test]
    fn test_installer_is_read_only() {
        let perm = enforcer();
        tokio_test::block_on(async {
            assert!(perm.check(Role::Installer, res::ORDERS, READ).await);
            assert!(perm.check(Role::Installer, res::ORDER_STATUS, WRITE).await);
            assert!(!perm.check(Role::Installer, res::ORDERS, WRITE).await);
            assert!(!perm.check(Role::Installer, res::CLIENTS, WRITE).await);
            assert!(!perm.check(Role::Installer, res::EXPORT, READ).await);
        });
    }

    #[test]
    fn test_readable_resources() {
        let perm = enforcer();
        let resources = tokio_test::block_on(perm.readable(Role::Installer));
        assert!(resources.contains(&"orders".to_string()));
        assert!(!resources.contains(&"finance".to_string()));
    }
}
