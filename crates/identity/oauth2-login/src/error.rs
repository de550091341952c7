//! OAuth2 error types.

use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Provider '{0}' not configured")]
    ProviderNotFound(String),

    /// The callback `state` is unknown, expired, already consumed or was
    /// issued for another provider.
    #[error("Invalid state parameter")]
    InvalidState,

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Callback error: {0}")]
    CallbackError(String),

    #[error("Token endpoint returned {status}: {body}")]
    TokenEndpointError { status: u16, body: String },

    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    #[error("Invalid session cookie: {0}")]
    DecodeError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}
