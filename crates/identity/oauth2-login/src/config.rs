//! Provider configuration and registry.

use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// OAuth2 configuration for a single identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Additional parameters to include in the authorization request
    #[serde(default)]
    pub auth_params: BTreeMap<String, String>,
    /// Whether to use PKCE
    #[serde(default)]
    pub use_pkce: bool,
}

impl ProviderConfig {
    /// Check that every required field is present and the endpoints parse.
    pub fn validate(&self) -> OAuth2Result<()> {
        let required = [
            ("id", &self.id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("redirect_uri", &self.redirect_uri),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OAuth2Error::ConfigError(format!(
                    "provider '{}' is missing required field '{}'",
                    self.id, field
                )));
            }
        }

        for (field, value) in [
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("redirect_uri", &self.redirect_uri),
        ] {
            Url::parse(value).map_err(|e| {
                OAuth2Error::ConfigError(format!(
                    "provider '{}' has an invalid {}: {}",
                    self.id, field, e
                ))
            })?;
        }

        Ok(())
    }
}

/// Read-only lookup of provider configurations by id
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    /// Build a registry, validating every provider.
    pub fn new(providers: impl IntoIterator<Item = ProviderConfig>) -> OAuth2Result<Self> {
        let mut map = HashMap::new();
        for provider in providers {
            provider.validate()?;
            if map.contains_key(&provider.id) {
                return Err(OAuth2Error::ConfigError(format!(
                    "provider '{}' is configured twice",
                    provider.id
                )));
            }
            map.insert(provider.id.clone(), provider);
        }

        Ok(Self { providers: map })
    }

    pub fn get(&self, provider_id: &str) -> OAuth2Result<&ProviderConfig> {
        self.providers
            .get(provider_id)
            .ok_or_else(|| OAuth2Error::ProviderNotFound(provider_id.to_string()))
    }

    /// Provider ids in sorted order
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Longest lifetime a pending authorization state may be given (one day)
pub const MAX_STATE_TTL_SECONDS: u64 = 86_400;

/// OAuth2 client configuration
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub state_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            state_ttl_seconds: 600, // 10 minutes
            http_timeout_seconds: 10,
        }
    }
}

impl OAuth2Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_ttl(mut self, seconds: u64) -> Self {
        self.state_ttl_seconds = seconds;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn validate(&self) -> OAuth2Result<()> {
        if !(1..=MAX_STATE_TTL_SECONDS).contains(&self.state_ttl_seconds) {
            return Err(OAuth2Error::ConfigError(format!(
                "state TTL must be between 1 and {MAX_STATE_TTL_SECONDS} seconds, got {}",
                self.state_ttl_seconds
            )));
        }

        if self.http_timeout_seconds == 0 {
            return Err(OAuth2Error::ConfigError(
                "HTTP timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
