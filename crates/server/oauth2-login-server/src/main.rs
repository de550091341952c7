use anyhow::{Context, Result};
use oauth2_login::{InMemoryStateStore, OAuth2Client};
use oauth2_login_server::config::Config;
use oauth2_login_server::{AppState, router, spawn_state_cleanup, telemetry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    telemetry::init(&config)?;

    let registry = config.registry()?;
    info!("Configured providers: {}", registry.ids().join(", "));

    let state_store = Arc::new(InMemoryStateStore::with_max_pending(
        config.oauth.max_pending_states,
    ));
    let client = OAuth2Client::new(&config.oauth.client_config(), state_store.clone())
        .context("Failed to create OAuth2 client")?;

    spawn_state_cleanup(
        state_store,
        Duration::from_secs(config.oauth.cleanup_interval_seconds),
    );

    let app = router(AppState::new(registry, client));

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Server running on http://{}", addr);
    warn!("Tokens are stored unsigned in the `tok` cookie; do not use in production.");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
