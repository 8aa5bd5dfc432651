use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tally::analytics::IpHasher;
use tally::api;
use tally::config::Config;
use tally::storage::Backend;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // A storage failure leaves the server up; analytics routes answer 500
    let backend = Backend::connect(&config.database).await;

    if config.analytics.ip_salt.is_none() {
        warn!("IP_SALT is not set, using a random key; visitor digests will not survive restarts");
    }
    let hasher = Arc::new(IpHasher::from_config(config.analytics.ip_salt.as_deref())?);

    let api_router = api::create_api_router(backend, hasher, config.analytics.clone());

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);
    info!("   - Track endpoint at http://{}/api/analytics/track", api_addr);
    info!("   - Reports at http://{}/api/analytics?uid=...", api_addr);

    axum::serve(
        api_listener,
        api_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
