//! OAuth2 authorization code client.
//!
//! This crate implements the client half of the OAuth2 Authorization Code flow:
//! building the provider redirect with a single-use anti-forgery `state`,
//! exchanging the returned code for a token at the provider's token endpoint,
//! and encoding the resulting token into a cookie value. PKCE can be enabled
//! per provider.

mod client;
mod config;
pub mod cookie;
mod error;
mod state;
mod types;


pub use client::{OAuth2Client, PkceChallenge};
pub use config::{MAX_STATE_TTL_SECONDS, OAuth2Config, ProviderConfig, ProviderRegistry};
pub use error::{OAuth2Error, OAuth2Result};
pub use state::{
    AuthorizationState, AuthorizationStateStore, DEFAULT_MAX_PENDING_STATES, InMemoryStateStore,
};
pub use types::{CallbackParams, TokenEndpointResponse, TokenRecord};
