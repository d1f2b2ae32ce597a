use sea_orm::{
    ConnectionTrait, ConnectOptions, Database, DatabaseConnection, DbBackend, DbErr, Schema,
    Statement,
};
use sea_orm::sea_query::TableCreateStatement;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{
    client, installer_salary_config, manager_salary_config, order, order_installer, order_item,
    owner_salary_config, salary_adjustment, salary_config, salary_payment, service, transaction,
    user, user_salary_assignment,
};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    info!("Connecting to database: {}", config.display_target());
    ensure_sqlite_dir(config)?;

    let db = Database::connect(connect_options(config)).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut opt = ConnectOptions::new(config.connection_url());
    opt.max_connections(config.max_connections.max(1))
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    if config.is_sqlite() {
        // Every sqlite in-memory connection is its own database
        if config.path == ":memory:" {
            opt.max_connections(1);
        }
    } else {
        opt.idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .set_schema_search_path("public");
    }
    opt
}

/// Make sure the directory of a sqlite database file exists
fn ensure_sqlite_dir(config: &DatabaseConfig) -> Result<(), DbErr> {
    if !config.is_sqlite() || config.path == ":memory:" {
        return Ok(());
    }
    match Path::new(&config.path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .map_err(|e| DbErr::Custom(format!("cannot create {}: {}", dir.display(), e))),
        _ => Ok(()),
    }
}

/// Create every table that does not exist yet
pub async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    // Create tables in dependency order
    // 1. Independent tables first
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(client::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(service::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(salary_config::Entity)).await?;

    // 2. Orders and everything hanging off them
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(order::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(order_installer::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(order_item::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(transaction::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(salary_payment::Entity)).await?;

    // 3. Salary configuration
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(manager_salary_config::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(installer_salary_config::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(owner_salary_config::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user_salary_assignment::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(salary_adjustment::Entity)).await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

/// Create a table if it doesn't exist
async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}

/// Fresh in-memory database with the full schema
#[cfg(test)]
pub async fn test_db() -> DatabaseConnection {
    init_database(&DatabaseConfig::in_memory())
        .await
        .expect("in-memory sqlite")
}
