//! Cached, self-refreshing access tokens.

use tokio::sync::Mutex;
use tracing::debug;

use crate::client::OAuthClient;
use crate::error::{Error, Result};
use crate::token::Token;

/// Hands out access tokens for one `OAuth2` grant, refreshing when needed.
///
/// A source is optionally bound to the address the grant was issued for;
/// asking for a token on behalf of any other address fails instead of
/// returning a token for the wrong account.
#[derive(Debug)]
pub struct TokenSource {
    client: OAuthClient,
    token: Mutex<Token>,
    bound_email: Option<String>,
}

impl TokenSource {
    /// Creates a source from a refresh token obtained during setup.
    #[must_use]
    pub fn new(client: OAuthClient, refresh_token: impl Into<String>) -> Self {
        Self::with_token(client, Token::from_refresh_token(refresh_token))
    }

    /// Creates a source seeded with an existing token.
    #[must_use]
    pub fn with_token(client: OAuthClient, token: Token) -> Self {
        Self {
            client,
            token: Mutex::new(token),
            bound_email: None,
        }
    }

    /// Binds the source to the address the grant belongs to.
    #[must_use]
    pub fn bound_to(mut self, email: impl Into<String>) -> Self {
        self.bound_email = Some(email.into());
        self
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &OAuthClient {
        &self.client
    }

    /// Returns a valid access token, refreshing it first if it has expired.
    ///
    /// With `email` set, the token is scoped to that address; without it the
    /// token is address-agnostic.
    ///
    /// # Errors
    ///
    /// Returns an error if `email` differs from the bound address or the
    /// refresh fails.
    pub async fn access_token(&self, email: Option<&str>) -> Result<String> {
        if let (Some(requested), Some(bound)) = (email, self.bound_email.as_deref())
            && !requested.eq_ignore_ascii_case(bound)
        {
            return Err(Error::AccountMismatch {
                bound: bound.to_string(),
                requested: requested.to_string(),
            });
        }

        let mut token = self.token.lock().await;
        if token.is_expired() {
            debug!("Access token expired, refreshing");
            *token = self.client.refresh_token(&token).await?;
        }
        Ok(token.access_token.clone())
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
    use crate::provider::Provider;

    fn client() -> OAuthClient {
        OAuthClient::new("client", Provider::google().unwrap())
    }

    #[tokio::test]
    async fn test_valid_token_is_returned_without_refresh() {
        let source = TokenSource::with_token(client(), Token::bearer("cached"));
        assert_eq!(source.access_token(None).await.unwrap(), "cached");
        assert_eq!(
            source.access_token(Some("bla@blubb.com")).await.unwrap(),
            "cached"
        );
    }

    #[tokio::test]
    async fn test_bound_source_rejects_other_address() {
        let source =
            TokenSource::with_token(client(), Token::bearer("cached")).bound_to("bla@blubb.com");

        assert_eq!(
            source.access_token(Some("BLA@blubb.com")).await.unwrap(),
            "cached"
        );
        let err = source.access_token(Some("other@blubb.com")).await;
        assert!(matches!(err, Err(Error::AccountMismatch { .. })));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token_fails() {
        let expired = Token::bearer("old").with_expires_at(chrono::Utc::now());
        let source = TokenSource::with_token(client(), expired);
        assert!(matches!(
            source.access_token(None).await,
            Err(Error::NoRefreshToken)
        ));
    }
}
