use tracing::{debug, info};

use super::Auth;
use crate::error::{Error, Result};

impl Auth {
    /// Acquires an `OAuth2` access token for the account.
    ///
    /// With a known address the token is requested for that address. Without
    /// one, an unscoped token is requested and the address is looked up with
    /// it; both are written only after both calls succeed, and the account
    /// is marked dirty since the address changed. The token itself is never
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuthUnavailable`] if no `OAuth2` service is
    /// configured, or the service's error. The account is unchanged on error.
    pub async fn get_oauth_token(&mut self) -> Result<()> {
        let oauth = self.oauth.clone().ok_or(Error::OAuthUnavailable)?;

        if let Some(address) = self.account.email_address.as_deref() {
            let token = oauth.get_oauth_token(Some(address)).await?;
            debug!("Acquired OAuth2 token for {address}");
            self.account.oauth_token = Some(token);
            return Ok(());
        }

        let token = oauth.get_oauth_token(None).await?;
        let address = oauth.query_email_address(&token).await?;
        info!("OAuth2 provider resolved account address {address}");

        self.account.email_address = Some(address);
        self.account.oauth_token = Some(token);
        self.account.credentials_dirty = true;
        Ok(())
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
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use mailkeep_oauth::Provider;

    use super::*;
    use crate::account::ConnectionConfig;
    use crate::auth::CredentialsUpdate;
    use crate::testing::{
        EMAIL_ADDRESS, FakeCodec, FakeOAuth, FakeStorage, OAUTH_TOKEN, OAuthCall, PASSWORD,
    };

    fn auth_with(oauth: &Arc<FakeOAuth>) -> (Auth, Arc<FakeStorage>, Arc<FakeCodec>) {
        let storage = Arc::new(FakeStorage::default());
        let codec = Arc::new(FakeCodec::default());
        let auth = Auth::new(storage.clone(), codec.clone()).with_oauth(oauth.clone());
        (auth, storage, codec)
    }

    fn gmail_update() -> CredentialsUpdate {
        CredentialsUpdate {
            imap: Some(ConnectionConfig::new("imap.gmail.com", 993, true)),
            smtp: Some(ConnectionConfig::new("smtp.gmail.com", 465, true)),
            ..CredentialsUpdate::default()
        }
    }

    #[tokio::test]
    async fn test_token_for_known_address() {
        let oauth = Arc::new(FakeOAuth::new(Some(OAUTH_TOKEN), None));
        let (mut auth, _, _) = auth_with(&oauth);
        auth.set_credentials(CredentialsUpdate {
            email_address: Some(EMAIL_ADDRESS.into()),
            ..CredentialsUpdate::default()
        });

        auth.get_oauth_token().await.unwrap();

        assert_eq!(auth.account().email_address.as_deref(), Some(EMAIL_ADDRESS));
        assert_eq!(auth.account().oauth_token.as_deref(), Some(OAUTH_TOKEN));
        assert_eq!(
            oauth.calls(),
            vec![OAuthCall::Token(Some(EMAIL_ADDRESS.into()))]
        );
    }

    #[tokio::test]
    async fn test_token_and_address_for_unknown_address() {
        let oauth = Arc::new(FakeOAuth::new(Some(OAUTH_TOKEN), Some(EMAIL_ADDRESS)));
        let (mut auth, _, _) = auth_with(&oauth);

        auth.get_oauth_token().await.unwrap();

        assert_eq!(auth.account().email_address.as_deref(), Some(EMAIL_ADDRESS));
        assert_eq!(auth.account().oauth_token.as_deref(), Some(OAUTH_TOKEN));
        assert!(auth.account().credentials_dirty);
        assert_eq!(
            oauth.calls(),
            vec![
                OAuthCall::Token(None),
                OAuthCall::Email(OAUTH_TOKEN.into())
            ]
        );
    }

    #[tokio::test]
    async fn test_token_failure() {
        let oauth = Arc::new(FakeOAuth::new(None, Some(EMAIL_ADDRESS)));
        let (mut auth, _, _) = auth_with(&oauth);
        auth.set_credentials(CredentialsUpdate {
            email_address: Some(EMAIL_ADDRESS.into()),
            ..CredentialsUpdate::default()
        });

        let err = auth.get_oauth_token().await.unwrap_err();

        assert!(matches!(err, Error::OAuth(_)));
        assert!(auth.account().oauth_token.is_none());
        assert_eq!(
            oauth.calls(),
            vec![OAuthCall::Token(Some(EMAIL_ADDRESS.into()))]
        );
    }

    #[tokio::test]
    async fn test_address_lookup_failure_sets_nothing() {
        let oauth = Arc::new(FakeOAuth::new(Some(OAUTH_TOKEN), None));
        let (mut auth, _, _) = auth_with(&oauth);

        let err = auth.get_oauth_token().await.unwrap_err();

        assert!(matches!(err, Error::OAuth(_)));
        assert!(auth.account().email_address.is_none());
        assert!(auth.account().oauth_token.is_none());
        assert!(!auth.account().credentials_dirty);
    }

    #[tokio::test]
    async fn test_without_service() {
        let mut auth = Auth::new(
            Arc::new(FakeStorage::default()),
            Arc::new(FakeCodec::default()),
        );
        assert!(matches!(
            auth.get_oauth_token().await,
            Err(Error::OAuthUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_credentials_use_token_for_oauth_host() {
        let oauth = Arc::new(FakeOAuth::new(Some(OAUTH_TOKEN), Some(EMAIL_ADDRESS)));
        let (mut auth, storage, codec) = auth_with(&oauth);
        auth.set_credentials(gmail_update());

        let credentials = auth.get_credentials().await.unwrap();

        assert_eq!(credentials.email_address.as_deref(), Some(EMAIL_ADDRESS));
        assert_eq!(credentials.imap.auth.xoauth2.as_deref(), Some(OAUTH_TOKEN));
        assert_eq!(credentials.smtp.auth.xoauth2.as_deref(), Some(OAUTH_TOKEN));
        assert!(credentials.imap.auth.pass.is_none());
        assert_eq!(storage.list_calls(), 0);
        assert_eq!(codec.decrypt_calls.load(Ordering::SeqCst), 0);

        // token is kept for the session
        auth.get_credentials().await.unwrap();
        assert_eq!(oauth.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_password_wins_over_oauth() {
        let oauth = Arc::new(FakeOAuth::new(Some(OAUTH_TOKEN), Some(EMAIL_ADDRESS)));
        let (mut auth, _, _) = auth_with(&oauth);
        auth.set_credentials(CredentialsUpdate {
            password: Some(PASSWORD.into()),
            ..gmail_update()
        });

        let credentials = auth.get_credentials().await.unwrap();

        assert!(credentials.imap.auth.xoauth2.is_none());
        assert!(oauth.calls().is_empty());
    }

    #[tokio::test]
    async fn test_token_is_never_stored() {
        let oauth = Arc::new(FakeOAuth::new(Some(OAUTH_TOKEN), Some(EMAIL_ADDRESS)));
        let (mut auth, storage, _) = auth_with(&oauth);
        auth.set_credentials(gmail_update());
        auth.get_credentials().await.unwrap();

        auth.store_credentials().await.unwrap();

        assert!(storage.stored("password").is_empty());
        let everything = storage.dump();
        assert!(!everything.contains(OAUTH_TOKEN));
        assert!(everything.contains(EMAIL_ADDRESS));
    }

    #[test]
    fn test_use_oauth() {
        let oauth = Arc::new(FakeOAuth::new(None, None));
        let (auth, _, _) = auth_with(&oauth);
        assert!(auth.use_oauth("imap.gmail.com"));
        assert!(!auth.use_oauth("mail.blablubb.com"));

        let plain = Auth::new(
            Arc::new(FakeStorage::default()),
            Arc::new(FakeCodec::default()),
        );
        assert!(!plain.use_oauth("imap.gmail.com"));
    }

    #[tokio::test]
    async fn test_service_of_other_provider_is_not_used() {
        let oauth = Arc::new(FakeOAuth::new(Some(OAUTH_TOKEN), Some(EMAIL_ADDRESS)));
        let (mut auth, _, _) = auth_with(&oauth);
        assert!(!auth.use_oauth("outlook.office365.com"));

        auth.set_credentials(CredentialsUpdate {
            imap: Some(ConnectionConfig::new("outlook.office365.com", 993, true)),
            smtp: Some(ConnectionConfig::new("smtp.office365.com", 587, false)),
            ..CredentialsUpdate::default()
        });
        let credentials = auth.get_credentials().await.unwrap();

        assert!(credentials.imap.auth.xoauth2.is_none());
        assert!(auth.account().oauth_token.is_none());
        assert!(oauth.calls().is_empty());

        let outlook = Arc::new(
            FakeOAuth::new(Some(OAUTH_TOKEN), None).with_provider(Provider::microsoft().unwrap()),
        );
        let (auth, _, _) = auth_with(&outlook);
        assert!(auth.use_oauth("outlook.office365.com"));
        assert!(!auth.use_oauth("imap.gmail.com"));
    }
}
