//! Session cookie codec.
//!
//! The token record is carried client-side as percent-encoded JSON. The value
//! is neither signed nor encrypted.

use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::TokenRecord;

/// Name of the cookie holding the encoded token
pub const TOKEN_COOKIE: &str = "tok";

pub fn encode(token: &TokenRecord) -> OAuth2Result<String> {
    let json = serde_json::to_string(token)?;
    Ok(urlencoding::encode(&json).into_owned())
}

pub fn decode(cookie_value: &str) -> OAuth2Result<TokenRecord> {
    let json = urlencoding::decode(cookie_value)
        .map_err(|e| OAuth2Error::DecodeError(e.to_string()))?;

    serde_json::from_str(&json).map_err(|e| OAuth2Error::DecodeError(e.to_string()))
}
