use anyhow::{Result, anyhow};
use sqlx::{
    Connection, PgConnection, PgPool, Postgres, Transaction,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;

/// Initialize the application connection pool
pub async fn init_pool(config: &AppConfig) -> Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow!("CHRONA_DATABASE_URL must be set"))?;

    info!("Initializing application database connection pool");

    let options = PgConnectOptions::from_str(database_url)?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    info!("Application database connection pool initialized");
    Ok(pool)
}

/// Create a single admin database connection for migrations
pub async fn create_admin_connection(config: &AppConfig) -> Result<PgConnection> {
    let admin_url = config
        .migration_url()
        .ok_or_else(|| anyhow!("CHRONA_DATABASE_ADMIN_URL must be set for running migrations"))?;

    info!("Creating admin database connection for migrations");

    let options = PgConnectOptions::from_str(admin_url)?;
    let conn = PgConnection::connect_with(&options).await?;

    info!("Admin database connection established");
    Ok(conn)
}

/// Scope row-level security to one organization for the rest of the transaction
pub async fn set_transaction_org_context(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_org_context($1)")
        .bind(org_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
