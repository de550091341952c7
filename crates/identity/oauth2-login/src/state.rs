//! Pending authorization state for CSRF protection.

use crate::error::{OAuth2Error, OAuth2Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, thread_rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

const STATE_BYTES: usize = 32;

/// Pending states kept by [`InMemoryStateStore::new`] before the oldest is evicted
pub const DEFAULT_MAX_PENDING_STATES: usize = 100_000;

/// State issued with an authorization redirect and consumed by its callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub value: String,
    pub provider_id: String,
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationState {
    pub fn new(
        provider_id: String,
        code_verifier: Option<String>,
        ttl_seconds: u64,
    ) -> OAuth2Result<Self> {
        let created_at = Utc::now();
        let expires_at = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                OAuth2Error::ConfigError(format!("state TTL of {ttl_seconds}s is out of range"))
            })?;

        Ok(Self {
            value: generate_state_value(),
            provider_id,
            code_verifier,
            created_at,
            expires_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// 256 bits from the thread-local CSPRNG, base64url encoded (43 chars).
fn generate_state_value() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Storage for pending authorization states
#[async_trait]
pub trait AuthorizationStateStore: Send + Sync {
    /// Store a new pending state
    async fn store(&self, state: AuthorizationState) -> OAuth2Result<()>;

    /// Remove and return a state. Fails with `InvalidState` when the value is
    /// unknown, already taken, or expired.
    async fn take(&self, value: &str) -> OAuth2Result<AuthorizationState>;

    /// Drop expired states, returning how many were removed
    async fn cleanup_expired(&self) -> OAuth2Result<usize>;

    /// Number of states still pending
    async fn pending(&self) -> usize;
}

/// In-memory implementation of AuthorizationStateStore.
///
/// Holds at most `max_pending` states. When full, expired states are pruned
/// first and then the oldest pending state is evicted.
#[derive(Clone)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, AuthorizationState>>>,
    max_pending: usize,
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING_STATES)
    }
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            max_pending: max_pending.max(1),
        }
    }
}

#[async_trait]
impl AuthorizationStateStore for InMemoryStateStore {
    async fn store(&self, state: AuthorizationState) -> OAuth2Result<()> {
        let mut states = self.states.write().await;

        if states.len() >= self.max_pending {
            let now = Utc::now();
            states.retain(|_, pending| now <= pending.expires_at);
        }

        if states.len() >= self.max_pending {
            let oldest = states
                .values()
                .min_by_key(|pending| pending.created_at)
                .map(|pending| pending.value.clone());

            if let Some(oldest) = oldest {
                states.remove(&oldest);
                warn!(
                    max_pending = self.max_pending,
                    "Pending state limit reached, evicted oldest state"
                );
            }
        }

        states.insert(state.value.clone(), state);
        Ok(())
    }

    async fn take(&self, value: &str) -> OAuth2Result<AuthorizationState> {
        let state = {
            let mut states = self.states.write().await;
            states.remove(value).ok_or(OAuth2Error::InvalidState)?
        };

        if state.is_expired() {
            return Err(OAuth2Error::InvalidState);
        }

        Ok(state)
    }

    async fn cleanup_expired(&self) -> OAuth2Result<usize> {
        let mut states = self.states.write().await;
        let now = Utc::now();

        let before = states.len();
        states.retain(|_, state| now <= state.expires_at);

        Ok(before - states.len())
    }

    async fn pending(&self) -> usize {
        self.states.read().await.len()
    }
}
