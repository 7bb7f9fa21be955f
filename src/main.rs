//! PriceCast - Commodity Price Forecasting & Calibration Service
//! Daily price history in, seven-day calibrated forecasts out.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricecast_backend::api::create_router;
use pricecast_backend::config::Config;
use pricecast_backend::forecast::{BatchOrchestrator, ForecastStore};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("🚀 PriceCast forecasting service starting");

    let config = Config::from_env();

    let store = ForecastStore::open(&config.storage.database_path)
        .context("Failed to open forecast store")?;

    let orchestrator = Arc::new(
        BatchOrchestrator::new(store.clone(), &config.batch)
            .context("Failed to build batch orchestrator")?,
    );

    let app = create_router(store, orchestrator).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricecast_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
