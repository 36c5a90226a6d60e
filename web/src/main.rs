//! Cinetheque server binary.

use cinetheque_core::cache::CachedCatalog;
use cinetheque_core::clock::SystemClock;
use cinetheque_postgres::PostgresLedger;
use cinetheque_web::providers::{HttpCatalogResolver, HttpIdentityDirectory, HttpProcessorClient};
use cinetheque_web::{AppState, Config, build_router};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cinetheque=debug".into()),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "starting cinetheque server"
    );

    let ledger =
        PostgresLedger::connect(&config.database.url, config.database.max_connections).await?;
    ledger.migrate().await?;

    let clock = Arc::new(SystemClock);
    let catalog = CachedCatalog::new(
        HttpCatalogResolver::new(&config.catalog),
        chrono::Duration::minutes(config.catalog.cache_ttl_minutes),
        config.catalog.cache_capacity,
        clock.clone(),
    );

    let state = AppState::assemble(
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
        ledger,
        catalog,
        HttpProcessorClient::new(&config.processor),
        HttpIdentityDirectory::new(&config.identity),
        config.webhook.clone(),
        config.ingestion.retry_policy(),
        clock,
    );

    let app = build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
