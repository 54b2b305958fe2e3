// Entry point for the food photo analysis proxy

use food_lens::{
    build_router,
    core::config::{log_filter, Config},
    server::ANALYZE_ROUTE,
    AppState, Metrics,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    let filter = EnvFilter::new(log_filter(config.log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.require_api_key().context("Refusing to start without a model credential")?;

    info!("=== FOOD LENS ANALYSIS PROXY ===");
    info!(
        "Model: {} via {} (timeout {}s, retries {})",
        config.vision_model(),
        config.vision_base_url(),
        config.vision_timeout().as_secs(),
        config.max_retries()
    );

    let metrics = Metrics::new();
    let state = AppState::new(config.clone(), metrics)?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                  - Root endpoint");
    info!("  GET  /health            - Health check");
    info!("  GET  /metrics           - Prometheus metrics");
    info!("  GET  /stats             - Detailed statistics");
    info!("  POST {}  - Analyze a food photo (JSON {{ imageUrl }})", ANALYZE_ROUTE);
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
