//! OAuth2 protocol types.

use crate::error::{OAuth2Error, OAuth2Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Query parameters delivered to the redirect URI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Token obtained from a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_scopes: Option<String>,
}

/// Token endpoint response body as sent by the provider.
///
/// Every field is optional on the wire so that error bodies (RFC 6749 §5.2)
/// and bodies missing `access_token` can be told apart from garbage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenEndpointResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenEndpointResponse {
    pub fn from_json(body: &str) -> OAuth2Result<Self> {
        serde_json::from_str(body).map_err(|e| OAuth2Error::MalformedResponse(e.to_string()))
    }

    /// GitHub answers with a form-encoded body unless JSON is negotiated.
    pub fn from_form(body: &str) -> OAuth2Result<Self> {
        let fields: HashMap<String, String> = url::form_urlencoded::parse(body.trim().as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if fields.is_empty() {
            return Err(OAuth2Error::MalformedResponse(
                "empty form-encoded token response".to_string(),
            ));
        }

        serde_json::to_value(fields)
            .and_then(serde_json::from_value)
            .map_err(|e| OAuth2Error::MalformedResponse(e.to_string()))
    }

    /// Convert into a token record, with `expires_in` counted from `now`.
    pub fn into_record(self, now: DateTime<Utc>) -> OAuth2Result<TokenRecord> {
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                OAuth2Error::MalformedResponse("response missing access_token".to_string())
            })?;

        let token_type = self
            .token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Bearer".to_string());

        let expiry = self
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));

        Ok(TokenRecord {
            access_token,
            token_type,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expiry,
            raw_scopes: self.scope,
        })
    }
}

fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) if s.is_empty() => Ok(None),
        Some(NumberOrString::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid expires_in: {s}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response_into_record() {
        let now = Utc::now();
        let response = TokenEndpointResponse::from_json(
            r#"{
                "access_token": "gho_abc",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "r1",
                "scope": "read:user"
            }"#,
        )
        .unwrap();

        let record = response.into_record(now).unwrap();
        assert_eq!(record.access_token, "gho_abc");
        assert_eq!(record.token_type, "bearer");
        assert_eq!(record.refresh_token.as_deref(), Some("r1"));
        assert_eq!(record.expiry, Some(now + Duration::seconds(3600)));
        assert_eq!(record.raw_scopes.as_deref(), Some("read:user"));
    }

    #[test]
    fn test_form_response_into_record() {
        let response = TokenEndpointResponse::from_form(
            "access_token=gho_abc&scope=repo%2Cgist&token_type=bearer&expires_in=28800",
        )
        .unwrap();

        assert_eq!(response.expires_in, Some(28800));

        let record = response.into_record(Utc::now()).unwrap();
        assert_eq!(record.access_token, "gho_abc");
        assert_eq!(record.raw_scopes.as_deref(), Some("repo,gist"));
    }

    #[test]
    fn test_absurd_lifetime_is_dropped() {
        let record = TokenEndpointResponse::from_json(
            r#"{"access_token": "t", "expires_in": 9223372036854775807}"#,
        )
        .unwrap()
        .into_record(Utc::now())
        .unwrap();

        assert_eq!(record.expiry, None);
    }

    #[test]
    fn test_token_type_defaults_to_bearer() {
        let record = TokenEndpointResponse::from_json(r#"{"access_token": "t"}"#)
            .unwrap()
            .into_record(Utc::now())
            .unwrap();

        assert_eq!(record.token_type, "Bearer");
        assert_eq!(record.expiry, None);
    }

    #[test]
    fn test_missing_access_token_is_malformed() {
        let response =
            TokenEndpointResponse::from_json(r#"{"token_type": "Bearer"}"#).unwrap();

        assert!(matches!(
            response.into_record(Utc::now()),
            Err(OAuth2Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            TokenEndpointResponse::from_json("<html>oops</html>"),
            Err(OAuth2Error::MalformedResponse(_))
        ));
        assert!(matches!(
            TokenEndpointResponse::from_form(""),
            Err(OAuth2Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_error_body_is_parsed() {
        let response = TokenEndpointResponse::from_form(
            "error=bad_verification_code&error_description=The+code+passed+is+incorrect",
        )
        .unwrap();

        assert_eq!(response.error.as_deref(), Some("bad_verification_code"));
        assert_eq!(
            response.error_description.as_deref(),
            Some("The code passed is incorrect")
        );
    }
}
