//! HTTP client for the token and userinfo endpoints.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// Subset of the `OpenID` userinfo document we care about.
#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
}

/// Talks to one provider's token and userinfo endpoints.
#[derive(Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret (optional for public clients).
    pub client_secret: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    http_client: Client,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("provider", &self.provider.name)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Refreshes an access token using its refresh token.
    ///
    /// The returned token keeps the old refresh token when the server does
    /// not rotate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails or if the token has no refresh token.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let scope = self.provider.default_scopes.join(" ");
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", token.refresh_token()?),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret));
        }
        if !scope.is_empty() {
            form.push(("scope", &scope));
        }

        debug!("Refreshing access token with {}", self.provider.name);
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await?;
            return Err(error.into());
        }

        let refreshed = Token::from_response(response.json::<TokenResponse>().await?)?;
        Ok(Token {
            refresh_token: refreshed.refresh_token.or_else(|| token.refresh_token.clone()),
            ..refreshed
        })
    }

    /// Queries the email address that owns `access_token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the token is rejected, or the
    /// provider reports no (or an unverified) address.
    pub async fn query_email_address(&self, access_token: &str) -> Result<String> {
        let response = self
            .http_client
            .get(self.provider.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::oauth_error(
                "userinfo_failed",
                format!("{} returned {}", self.provider.name, response.status()),
            ));
        }

        let info: UserInfo = response.json().await?;
        email_from_userinfo(info)
    }
}

fn email_from_userinfo(info: UserInfo) -> Result<String> {
    if info.email_verified == Some(false) {
        return Err(Error::InvalidResponse("email address is not verified".into()));
    }
    info.email
        .filter(|email| !email.trim().is_empty())
        .ok_or(Error::MissingEmail)
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
    fn test_oauth_client_with_secret() {
        let client = OAuthClient::new("client", Provider::google().unwrap())
            .with_client_secret("secret");
        assert_eq!(client.client_id, "client");
        assert_eq!(client.client_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn test_userinfo_email() {
        let info: UserInfo =
            serde_json::from_str(r#"{"sub":"1","email":"bla@blubb.com","email_verified":true}"#)
                .unwrap();
        assert_eq!(email_from_userinfo(info).unwrap(), "bla@blubb.com");
    }

    #[test]
    fn test_userinfo_without_email() {
        let info: UserInfo = serde_json::from_str(r#"{"sub":"1"}"#).unwrap();
        assert!(matches!(email_from_userinfo(info), Err(Error::MissingEmail)));
    }

    #[test]
    fn test_userinfo_unverified_email() {
        let info: UserInfo =
            serde_json::from_str(r#"{"email":"bla@blubb.com","email_verified":false}"#).unwrap();
        assert!(matches!(
            email_from_userinfo(info),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let client = OAuthClient::new("client", Provider::google().unwrap());
        let result = client.refresh_token(&Token::bearer("a")).await;
        assert!(matches!(result, Err(Error::NoRefreshToken)));
    }
}
