//! Access tokens and token endpoint payloads.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Tokens are refreshed this many seconds before they actually expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// An access token and the refresh token it was issued with.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    /// Bearer credential sent to the mail server.
    pub access_token: String,
    /// When the access token stops working; `None` if the server did not say.
    pub expires_at: Option<DateTime<Utc>>,
    /// Long-lived grant used to mint new access tokens.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

impl Token {
    /// Wraps an access token with unknown lifetime.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
            refresh_token: None,
        }
    }

    /// A token holding only a refresh token; the first use refreshes it.
    #[must_use]
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            expires_at: None,
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Builds a token from a successful token endpoint answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] if the access token is empty.
    pub fn from_response(response: TokenResponse) -> Result<Self> {
        if response.access_token.trim().is_empty() {
            return Err(Error::InvalidResponse("empty access_token".into()));
        }

        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Ok(Self {
            access_token: response.access_token,
            expires_at,
            refresh_token: response.refresh_token,
        })
    }

    /// Returns true if the access token is missing or close to expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.expires_at
            .is_some_and(|at| at <= Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS))
    }

    /// Sets the expiry time.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// The refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshToken`] if the grant cannot be refreshed.
    pub fn refresh_token(&self) -> Result<&str> {
        self.refresh_token.as_deref().ok_or(Error::NoRefreshToken)
    }
}

/// Successful token endpoint answer (RFC 6749 section 5.1).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// New access token.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Rotated refresh token, if the server issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Failed token endpoint answer (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// Error code such as `invalid_grant`.
    pub error: String,
    /// Optional explanation.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl From<ErrorResponse> for Error {
    fn from(response: ErrorResponse) -> Self {
        Self::oauth_error(
            response.error,
            response.error_description.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_without_expiry_stays_valid() {
        assert!(!Token::bearer("ya29.a0").is_expired());
    }

    #[test]
    fn test_refresh_only_token_needs_refresh() {
        let token = Token::from_refresh_token("1//refresh");
        assert!(token.is_expired());
        assert_eq!(token.refresh_token().unwrap(), "1//refresh");
    }

    #[test]
    fn test_refresh_margin() {
        let soon = Token::bearer("a").with_expires_at(Utc::now() + Duration::seconds(30));
        assert!(soon.is_expired());

        let later = Token::bearer("a").with_expires_at(Utc::now() + Duration::seconds(3600));
        assert!(!later.is_expired());
    }

    #[test]
    fn test_bearer_cannot_refresh() {
        assert!(matches!(
            Token::bearer("a").refresh_token(),
            Err(Error::NoRefreshToken)
        ));
    }

    #[test]
    fn test_parse_token_response() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"ya29.x","token_type":"Bearer","expires_in":3599,"scope":"email"}"#,
        )
        .unwrap();

        let token = Token::from_response(response).unwrap();
        assert_eq!(token.access_token, "ya29.x");
        assert!(!token.is_expired());
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_empty_access_token_rejected() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":" ","expires_in":10}"#).unwrap();
        assert!(matches!(
            Token::from_response(response),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_error_response() {
        let response: ErrorResponse =
            serde_json::from_str(r#"{"error":"invalid_grant"}"#).unwrap();
        let err = Error::from(response);
        assert!(matches!(err, Error::OAuth { ref error, .. } if error == "invalid_grant"));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let token = Token::bearer("ya29.secret").with_expires_at(Utc::now());
        assert!(!format!("{token:?}").contains("ya29.secret"));
    }
}
