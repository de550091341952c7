//! Mapping of request failures to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use oauth2_login::OAuth2Error;
use tracing::{debug, warn};

/// Body returned for every rejected login or session
pub const UNAUTHORIZED_BODY: &str = "UNAUTHORIZED";

#[derive(Debug)]
pub enum AppError {
    /// No token cookie on the request
    MissingSession,
    OAuth2(OAuth2Error),
}

impl From<OAuth2Error> for AppError {
    fn from(err: OAuth2Error) -> Self {
        Self::OAuth2(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MissingSession => {
                debug!("Request without session cookie");
                (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response()
            }
            AppError::OAuth2(OAuth2Error::ProviderNotFound(provider)) => {
                debug!(provider = %provider, "Unknown provider requested");
                (StatusCode::NOT_FOUND, "NOT FOUND").into_response()
            }
            AppError::OAuth2(OAuth2Error::TokenEndpointError { status, .. }) => {
                // the provider's body may echo the code, keep it out of the logs
                warn!(status, "Token endpoint rejected the exchange");
                (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response()
            }
            AppError::OAuth2(err) => {
                warn!(error = %err, "Login rejected");
                (StatusCode::UNAUTHORIZED, UNAUTHORIZED_BODY).into_response()
            }
        }
    }
}
