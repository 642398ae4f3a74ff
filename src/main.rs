use anyhow::Result;
use dotenv::dotenv;
use sqlx::Connection;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use chrona::auth::JwtConfig;
use chrona::config::{AppConfig, StorageBackend};
use chrona::db;
use chrona::http::{self, AppState};
use chrona::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting chrona");
    let config = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => {
            let mut admin_conn = db::create_admin_connection(&config).await?;

            info!("Running database migrations with admin privileges");
            sqlx::migrate!("./sql/migrations").run(&mut admin_conn).await?;
            info!("Migrations completed successfully");

            if let Err(e) = admin_conn.close().await {
                warn!("Failed to close admin connection cleanly: {}", e);
            }

            let pool = db::init_pool(&config).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let jwt_config = JwtConfig::from_settings(&config.jwt);
    let app = http::router(AppState::new(store, jwt_config));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
