//! HTTP routes for the login flow.
//!
//! `GET /login/{provider}/` redirects to the provider, the provider sends the
//! browser back to `GET /login/{provider}/callback`, which exchanges the code,
//! stores the token in the `tok` cookie and redirects to `GET /loggedin`.

use crate::error::AppError;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use oauth2_login::cookie::{self, TOKEN_COOKIE};
use oauth2_login::{CallbackParams, OAuth2Client, ProviderRegistry, TokenRecord};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Page the browser lands on after a successful login
pub const LOGGED_IN_PATH: &str = "/loggedin";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub client: OAuth2Client,
}

impl AppState {
    pub fn new(registry: ProviderRegistry, client: OAuth2Client) -> Self {
        Self {
            registry: Arc::new(registry),
            client,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/login/{provider}", get(login_handler))
        .route("/login/{provider}/", get(login_handler))
        .route("/login/{provider}/callback", get(callback_handler))
        .route(LOGGED_IN_PATH, get(logged_in_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 302 Found, which is what browsers and the providers' docs expect here.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let links: String = state
        .registry
        .ids()
        .into_iter()
        .map(|id| {
            format!(
                "<div>\n\t<a href=\"/login/{}/\">LOGIN {}</a>\n</div>\n",
                id,
                id.to_uppercase()
            )
        })
        .collect();

    Html(links)
}

async fn login_handler(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Result<Response, AppError> {
    let provider = state.registry.get(&provider_id)?;
    let (auth_url, _) = state.client.build_redirect(provider).await?;

    info!(provider = %provider.id, "Redirecting to authorization endpoint");
    Ok(found(&auth_url))
}

async fn callback_handler(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Response), AppError> {
    let provider = state.registry.get(&provider_id)?;
    let token = state.client.handle_callback(provider, params).await?;
    let value = cookie::encode(&token)?;

    let session = Cookie::build((TOKEN_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    info!(provider = %provider.id, "Login completed");
    Ok((jar.add(session), found(LOGGED_IN_PATH)))
}

async fn logged_in_handler(jar: CookieJar) -> Result<Response, AppError> {
    let raw = jar.get(TOKEN_COOKIE).ok_or(AppError::MissingSession)?;
    let token = cookie::decode(raw.value())?;

    let body = pretty_json(&token)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Tab-indented JSON
fn pretty_json(token: &TokenRecord) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);

    token
        .serialize(&mut serializer)
        .map_err(|e| AppError::OAuth2(e.into()))?;

    buf.push(b'\n');
    Ok(buf)
}
