//! `OAuth2` collaborator interface.

use async_trait::async_trait;
use mailkeep_oauth::TokenSource;

/// Token acquisition and address lookup for `OAuth2` providers.
#[async_trait]
pub trait OAuthService: Send + Sync {
    /// Fetches an access token, scoped to `email_address` when known.
    async fn get_oauth_token(&self, email_address: Option<&str>) -> mailkeep_oauth::Result<String>;

    /// Resolves the email address that owns `token`.
    async fn query_email_address(&self, token: &str) -> mailkeep_oauth::Result<String>;

    /// Returns true if tokens from this service are accepted by `host`.
    fn serves(&self, host: &str) -> bool;
}

#[async_trait]
impl OAuthService for TokenSource {
    async fn get_oauth_token(&self, email_address: Option<&str>) -> mailkeep_oauth::Result<String> {
        self.access_token(email_address).await
    }

    async fn query_email_address(&self, token: &str) -> mailkeep_oauth::Result<String> {
        self.client().query_email_address(token).await
    }

    fn serves(&self, host: &str) -> bool {
        self.client().provider.serves(host)
    }
}
