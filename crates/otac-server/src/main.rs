//! OTAC Server: Application entry point.

mod config;

use otac_core::repository::{Pagination, TenantRepository};
use otac_db::{DbManager, SurrealTenantRepository};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))?;
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    tracing::info!("Starting OTAC server...");

    let manager = DbManager::connect(&config.database).await?;
    let db = manager.client().clone();
    otac_db::run_migrations(&db).await?;

    let tenants = SurrealTenantRepository::new(db).with_limits(config.limits);
    let page = tenants
        .list(Pagination::first(config.limits.max_page_size))
        .await?;
    tracing::info!(
        tenants = page.items.len(),
        more = page.next_page_token.is_some(),
        "Access-check engine ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("OTAC server stopped.");
    Ok(())
}
