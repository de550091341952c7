//! OAuth2 login server
//!
//! Serves the authorization code flow for the configured providers:
//! - `GET /` lists a login link per provider
//! - `GET /login/{provider}/` redirects to the provider
//! - `GET /login/{provider}/callback` exchanges the code and sets the `tok` cookie
//! - `GET /loggedin` shows the token from the cookie

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use oauth2_login::AuthorizationStateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use routes::{AppState, router};

/// Periodically drop expired authorization states.
pub fn spawn_state_cleanup(
    store: Arc<dyn AuthorizationStateStore>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match store.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Pruned expired authorization states"),
                Err(e) => warn!("Failed to prune authorization states: {}", e),
            }
        }
    })
}
