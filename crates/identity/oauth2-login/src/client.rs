//! OAuth2 client: authorization redirects and code-for-token exchange.

use crate::config::{OAuth2Config, ProviderConfig};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::state::{AuthorizationState, AuthorizationStateStore};
use crate::types::{CallbackParams, TokenEndpointResponse, TokenRecord};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::{Rng, thread_rng};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    pub fn new() -> Self {
        let code_verifier = Self::generate_code_verifier();
        let code_challenge = Self::generate_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    fn generate_code_verifier() -> String {
        let mut rng = thread_rng();
        let bytes: Vec<u8> = (0..64).map(|_| rng.r#gen::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn generate_code_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

/// OAuth2 client for driving the authorization code flow
#[derive(Clone)]
pub struct OAuth2Client {
    http_client: Client,
    state_store: Arc<dyn AuthorizationStateStore>,
    state_ttl_seconds: u64,
}

impl OAuth2Client {
    pub fn new(
        config: &OAuth2Config,
        state_store: Arc<dyn AuthorizationStateStore>,
    ) -> OAuth2Result<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            state_store,
            state_ttl_seconds: config.state_ttl_seconds,
        })
    }

    pub fn state_store(&self) -> &Arc<dyn AuthorizationStateStore> {
        &self.state_store
    }

    /// Build the authorization endpoint URL and record the pending state.
    pub async fn build_redirect(
        &self,
        provider: &ProviderConfig,
    ) -> OAuth2Result<(String, AuthorizationState)> {
        let mut url = Url::parse(&provider.auth_url)?;

        let pkce = provider.use_pkce.then(PkceChallenge::new);

        let state = AuthorizationState::new(
            provider.id.clone(),
            pkce.as_ref().map(|p| p.code_verifier.clone()),
            self.state_ttl_seconds,
        )?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &provider.client_id);
            params.append_pair("redirect_uri", &provider.redirect_uri);

            if !provider.scopes.is_empty() {
                params.append_pair("scope", &provider.scopes.join(" "));
            }

            params.append_pair("state", &state.value);

            if let Some(pkce) = &pkce {
                params.append_pair("code_challenge", &pkce.code_challenge);
                params.append_pair("code_challenge_method", &pkce.code_challenge_method);
            }

            for (key, value) in &provider.auth_params {
                params.append_pair(key, value);
            }
        }

        self.state_store.store(state.clone()).await?;

        debug!(provider = %provider.id, "Generated authorization URL");

        Ok((url.to_string(), state))
    }

    /// Validate the callback parameters and exchange the code.
    pub async fn handle_callback(
        &self,
        provider: &ProviderConfig,
        callback: CallbackParams,
    ) -> OAuth2Result<TokenRecord> {
        let received_state = callback.state.ok_or(OAuth2Error::InvalidState)?;

        if let Some(error) = callback.error {
            // burn the state so the attempt cannot be resumed
            self.consume_state(provider, &received_state).await?;

            let description = callback
                .error_description
                .as_deref()
                .unwrap_or("No description");
            return Err(OAuth2Error::CallbackError(format!(
                "{}: {}",
                error, description
            )));
        }

        let Some(code) = callback.code.filter(|code| !code.is_empty()) else {
            self.consume_state(provider, &received_state).await?;
            return Err(OAuth2Error::MissingAuthorizationCode);
        };

        self.exchange(provider, &code, &received_state).await
    }

    /// Exchange an authorization code for a token.
    ///
    /// The state is consumed before the token endpoint is contacted, so a
    /// failed exchange cannot be replayed with the same state.
    pub async fn exchange(
        &self,
        provider: &ProviderConfig,
        code: &str,
        received_state: &str,
    ) -> OAuth2Result<TokenRecord> {
        let state = self.consume_state(provider, received_state).await?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
        ];

        if let Some(verifier) = state.code_verifier.as_deref() {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .http_client
            .post(&provider.token_url)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(provider = %provider.id, status = status.as_u16(), "Token exchange rejected");
            return Err(OAuth2Error::TokenEndpointError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = if content_type.starts_with("application/x-www-form-urlencoded")
            || content_type.starts_with("text/plain")
        {
            TokenEndpointResponse::from_form(&body)?
        } else {
            TokenEndpointResponse::from_json(&body)?
        };

        if let Some(error) = &parsed.error {
            warn!(provider = %provider.id, error = %error, "Token endpoint returned an OAuth2 error");
            return Err(OAuth2Error::TokenEndpointError {
                status: status.as_u16(),
                body,
            });
        }

        let token = parsed.into_record(Utc::now())?;

        info!(provider = %provider.id, "Successfully exchanged code for token");
        Ok(token)
    }

    async fn consume_state(
        &self,
        provider: &ProviderConfig,
        received_state: &str,
    ) -> OAuth2Result<AuthorizationState> {
        let state = self.state_store.take(received_state).await?;

        if state.provider_id != provider.id {
            warn!(
                expected = %provider.id,
                issued_for = %state.provider_id,
                "State presented to the wrong provider callback"
            );
            return Err(OAuth2Error::InvalidState);
        }

        Ok(state)
    }
}
