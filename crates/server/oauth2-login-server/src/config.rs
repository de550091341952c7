//! Configuration module for the OAuth2 login server
//!
//! Sources, lowest precedence first:
//! - Built-in defaults, including GitHub and EOEPCA provider presets
//! - Configuration file (config.toml, or the path in LOGIN_CONFIG_FILE)
//! - Environment variables with LOGIN__ prefix, e.g. LOGIN__PROVIDERS__GITHUB__CLIENT_ID.
//!   Values are kept as strings and only converted by the field they land in,
//!   so credentials such as `0123` survive unchanged.
//! - Legacy HOST, PORT and RUST_LOG variables

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config as ConfigSource, ConfigBuilder, Environment, File};
use oauth2_login::{
    DEFAULT_MAX_PENDING_STATES, MAX_STATE_TTL_SECONDS, OAuth2Config, ProviderConfig,
    ProviderRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info};

/// Main configuration struct for the login server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// OAuth2 client behaviour
    pub oauth: OAuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Identity providers keyed by id
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: IpAddr,

    /// Port to bind to (default: 3000)
    pub port: u16,
}

/// OAuth2 client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Lifetime of a pending authorization state (default: 600)
    pub state_ttl_seconds: u64,

    /// Timeout for token endpoint requests (default: 10)
    pub http_timeout_seconds: u64,

    /// How often expired states are pruned (default: 60)
    pub cleanup_interval_seconds: u64,

    /// Pending states held before the oldest is evicted (default: 100000)
    pub max_pending_states: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or full filter directive
    pub level: String,

    /// Log format (pretty, json, compact)
    pub format: String,

    /// Whether to include the target module
    pub target: bool,
}

/// A single provider entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_params: BTreeMap<String, String>,
    pub use_pkce: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_seconds: 600,
            http_timeout_seconds: 10,
            cleanup_interval_seconds: 60,
            max_pending_states: DEFAULT_MAX_PENDING_STATES,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            target: true,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: String::new(),
            token_url: String::new(),
            redirect_uri: String::new(),
            scopes: Vec::new(),
            auth_params: BTreeMap::new(),
            use_pkce: false,
        }
    }
}

impl OAuthConfig {
    pub fn client_config(&self) -> OAuth2Config {
        OAuth2Config::new()
            .with_state_ttl(self.state_ttl_seconds)
            .with_http_timeout(self.http_timeout_seconds)
    }
}

/// Endpoint presets for the built-in providers. Credentials are never defaulted.
fn provider_presets(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    builder
        .set_default(
            "providers.github.auth_url",
            "https://github.com/login/oauth/authorize",
        )?
        .set_default(
            "providers.github.token_url",
            "https://github.com/login/oauth/access_token",
        )?
        .set_default(
            "providers.github.redirect_uri",
            "http://localhost:3000/login/github/callback",
        )?
        .set_default("providers.github.auth_params.access_type", "offline")?
        .set_default(
            "providers.eoepca.auth_url",
            "https://test.demo.eoepca.org/oxauth/restv1/authorize",
        )?
        .set_default(
            "providers.eoepca.token_url",
            "https://test.demo.eoepca.org/oxauth/restv1/token",
        )?
        .set_default(
            "providers.eoepca.redirect_uri",
            "http://localhost:3000/login/eoepca/callback",
        )?
        .set_default(
            "providers.eoepca.scopes",
            vec![
                "openid".to_string(),
                "user_name".to_string(),
                "is_operator".to_string(),
            ],
        )?
        .set_default("providers.eoepca.auth_params.access_type", "offline")
}

/// `LOGIN__SECTION__KEY` variables, without eager number/bool parsing
fn environment() -> Environment {
    Environment::with_prefix("LOGIN").separator("__")
}

impl Config {
    /// Load configuration from defaults, optional config file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("LOGIN_CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        let mut builder = provider_presets(ConfigSource::builder())
            .context("Failed to register provider presets")?;

        if std::path::Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        builder = builder.add_source(environment());

        let mut settings = Self::from_builder(builder)?;
        settings.apply_env_overrides()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Deserialize a prepared builder without reading the process environment
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Presets plus a TOML document, used for file-less setups and tests
    pub fn from_toml(toml: &str) -> Result<Self> {
        let builder = provider_presets(ConfigSource::builder())
            .context("Failed to register provider presets")?
            .add_source(File::from_str(toml, config::FileFormat::Toml));

        Self::from_builder(builder)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("HOST") {
            info!("Using HOST environment variable");
            self.server.host = host.parse().context("Invalid HOST value")?;
        }

        if let Ok(port) = std::env::var("PORT") {
            info!("Using PORT environment variable");
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if !(1..=MAX_STATE_TTL_SECONDS).contains(&self.oauth.state_ttl_seconds) {
            anyhow::bail!(
                "State TTL must be between 1 and {} seconds",
                MAX_STATE_TTL_SECONDS
            );
        }

        if self.oauth.http_timeout_seconds == 0 {
            anyhow::bail!("HTTP timeout must be positive");
        }

        if self.oauth.cleanup_interval_seconds == 0 {
            anyhow::bail!("Cleanup interval must be positive");
        }

        if self.oauth.max_pending_states == 0 {
            anyhow::bail!("Max pending states must be positive");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        let is_directive = level_lower.contains('=') || level_lower.contains(',');
        if !is_directive && !valid_levels.contains(&level_lower.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        let registry = self.registry()?;
        if registry.is_empty() {
            anyhow::bail!("At least one provider must be enabled");
        }

        Ok(())
    }

    /// Provider configurations for every enabled provider
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        self.providers
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(id, settings)| ProviderConfig {
                id: id.clone(),
                client_id: settings.client_id.clone(),
                client_secret: settings.client_secret.clone(),
                auth_url: settings.auth_url.clone(),
                token_url: settings.token_url.clone(),
                redirect_uri: settings.redirect_uri.clone(),
                scopes: settings.scopes.clone(),
                auth_params: settings.auth_params.clone(),
                use_pkce: settings.use_pkce,
            })
            .collect()
    }

    /// Build the provider registry, failing on incomplete providers
    pub fn registry(&self) -> Result<ProviderRegistry> {
        ProviderRegistry::new(self.provider_configs()).context("Invalid provider configuration")
    }

    /// Get the socket address for the server
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.server.host, self.server.port))
    }

    /// Get the log filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.logging.level.contains('=') || self.logging.level.contains(',') {
            self.logging.level.clone()
        } else {
            format!(
                "oauth2_login_server={},oauth2_login={},tower_http={},{}",
                self.logging.level, self.logging.level, self.logging.level, self.logging.level
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREDENTIALS: &str = r#"
        [providers.github]
        client_id = "xxx"
        client_secret = "github-secret"

        [providers.eoepca]
        client_id = "eoepca-client"
        client_secret = "eoepca-secret"
    "#;

    #[test]
    fn test_presets_fill_endpoints() {
        let config = Config::from_toml(CREDENTIALS).unwrap();
        assert!(config.validate().is_ok());

        let registry = config.registry().unwrap();
        assert_eq!(registry.ids(), vec!["eoepca", "github"]);

        let github = registry.get("github").unwrap();
        assert_eq!(github.client_id, "xxx");
        assert_eq!(github.auth_url, "https://github.com/login/oauth/authorize");
        assert!(github.scopes.is_empty());
        assert_eq!(
            github.auth_params.get("access_type").map(String::as_str),
            Some("offline")
        );

        let eoepca = registry.get("eoepca").unwrap();
        assert_eq!(eoepca.scopes, vec!["openid", "user_name", "is_operator"]);
        assert_eq!(
            eoepca.redirect_uri,
            "http://localhost:3000/login/eoepca/callback"
        );
    }

    #[test]
    fn test_missing_credentials_fail_validation() {
        let config = Config::from_toml("").unwrap();
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("client_id"));
    }

    #[test]
    fn test_disabled_provider_is_skipped() {
        let config = Config::from_toml(
            r#"
            [providers.github]
            client_id = "xxx"
            client_secret = "github-secret"

            [providers.eoepca]
            enabled = false
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.registry().unwrap().ids(), vec!["github"]);
    }

    #[test]
    fn test_custom_provider_from_file() {
        let config = Config::from_toml(
            r#"
            [providers.github]
            enabled = false

            [providers.eoepca]
            enabled = false

            [providers.gitlab]
            client_id = "gl"
            client_secret = "gl-secret"
            auth_url = "https://gitlab.com/oauth/authorize"
            token_url = "https://gitlab.com/oauth/token"
            redirect_uri = "http://localhost:3000/login/gitlab/callback"
            scopes = ["read_user"]
            use_pkce = true
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        let registry = config.registry().unwrap();
        let gitlab = registry.get("gitlab").unwrap();
        assert!(gitlab.use_pkce);
        assert_eq!(gitlab.scopes, vec!["read_user"]);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::from_toml(CREDENTIALS).unwrap();
        config.server.port = 0;
        assert!(config.validate().is_err());

        config.server.port = 3000;
        config.oauth.state_ttl_seconds = 0;
        assert!(config.validate().is_err());

        config.oauth.state_ttl_seconds = MAX_STATE_TTL_SECONDS + 1;
        assert!(config.validate().is_err());

        config.oauth.state_ttl_seconds = 600;
        config.oauth.max_pending_states = 0;
        assert!(config.validate().is_err());

        config.oauth.max_pending_states = 1000;
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        config.logging.format = "json".to_string();
        config.logging.level = "oauth2_login=debug,info".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.log_filter(), "oauth2_login=debug,info");
    }

    #[test]
    fn test_huge_state_ttl_fails_validation() {
        let config = Config::from_toml(&format!(
            "{CREDENTIALS}\n[oauth]\nstate_ttl_seconds = 10000000000000\n"
        ))
        .unwrap();

        assert_eq!(config.oauth.state_ttl_seconds, 10_000_000_000_000);
        assert!(config.validate().is_err());

        // even without validation the client refuses to start, so no login can panic
        let client = oauth2_login::OAuth2Client::new(
            &config.oauth.client_config(),
            std::sync::Arc::new(oauth2_login::InMemoryStateStore::new()),
        );
        assert!(client.is_err());
    }

    #[test]
    fn test_environment_keeps_credentials_verbatim() {
        let vars: config::Map<String, String> = [
            ("LOGIN__PROVIDERS__GITHUB__CLIENT_ID", "0123"),
            ("LOGIN__PROVIDERS__GITHUB__CLIENT_SECRET", "1e5"),
            ("LOGIN__PROVIDERS__EOEPCA__ENABLED", "false"),
            ("LOGIN__SERVER__PORT", "8080"),
            ("LOGIN__OAUTH__STATE_TTL_SECONDS", "300"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

        let builder = provider_presets(ConfigSource::builder())
            .unwrap()
            .add_source(environment().source(Some(vars)));
        let config = Config::from_builder(builder).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.oauth.state_ttl_seconds, 300);

        let registry = config.registry().unwrap();
        assert_eq!(registry.ids(), vec!["github"]);
        let github = registry.get("github").unwrap();
        assert_eq!(github.client_id, "0123");
        assert_eq!(github.client_secret, "1e5");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml(CREDENTIALS).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.oauth.state_ttl_seconds, 600);
        assert_eq!(config.oauth.http_timeout_seconds, 10);
        assert_eq!(config.oauth.max_pending_states, DEFAULT_MAX_PENDING_STATES);
        assert!(config.log_filter().starts_with("oauth2_login_server=info"));
    }
}
