//! `OAuth2` provider configurations.

use crate::error::{Error, Result};
use url::Url;

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Token endpoint URL.
    pub token_url: Url,
    /// `OpenID` userinfo endpoint, used to resolve a token's email address.
    pub userinfo_url: Url,
    /// Mail server domains served by this provider (`gmail.com` matches
    /// `imap.gmail.com` and `smtp.gmail.com`).
    pub mail_domains: Vec<String>,
    /// Scopes requested when refreshing.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        name: impl Into<String>,
        token_url: impl AsRef<str>,
        userinfo_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            token_url: Url::parse(token_url.as_ref())?,
            userinfo_url: Url::parse(userinfo_url.as_ref())?,
            mail_domains: Vec::new(),
            default_scopes: Vec::new(),
        })
    }

    /// Sets the mail server domains.
    #[must_use]
    pub fn with_mail_domains(mut self, domains: &[&str]) -> Self {
        self.mail_domains = domains.iter().map(|d| (*d).to_string()).collect();
        self
    }

    /// Sets the scopes requested on refresh.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: &[&str]) -> Self {
        self.default_scopes = scopes.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Google `OAuth2` provider configuration.
    ///
    /// Scopes:
    /// - `https://mail.google.com/` - Full Gmail access (IMAP/SMTP)
    /// - `email` - Needed for the userinfo address lookup
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Ok(Self::new(
            "Google",
            "https://oauth2.googleapis.com/token",
            "https://openidconnect.googleapis.com/v1/userinfo",
        )?
        .with_mail_domains(&["gmail.com", "googlemail.com"])
        .with_default_scopes(&["https://mail.google.com/", "email"]))
    }

    /// Microsoft/Outlook `OAuth2` provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Ok(Self::new(
            "Microsoft",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            "https://graph.microsoft.com/oidc/userinfo",
        )?
        .with_mail_domains(&["office365.com", "outlook.com"])
        .with_default_scopes(&[
            "https://outlook.office.com/IMAP.AccessAsUser.All",
            "https://outlook.office.com/SMTP.Send",
            "offline_access",
            "email",
        ]))
    }

    /// Yahoo `OAuth2` provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn yahoo() -> Result<Self> {
        Ok(Self::new(
            "Yahoo",
            "https://api.login.yahoo.com/oauth2/get_token",
            "https://api.login.yahoo.com/openid/v1/userinfo",
        )?
        .with_mail_domains(&["mail.yahoo.com"])
        .with_default_scopes(&["mail-w", "mail-r", "openid"]))
    }

    /// Looks up a provider by its short identifier (`gmail`, `outlook`, `yahoo`).
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is unknown or URL parsing fails.
    pub fn by_id(id: &str) -> Result<Self> {
        match id.to_ascii_lowercase().as_str() {
            "gmail" | "google" => Self::google(),
            "outlook" | "microsoft" => Self::microsoft(),
            "yahoo" => Self::yahoo(),
            other => Err(Error::InvalidConfig(format!("unknown provider: {other}"))),
        }
    }

    /// Returns the provider serving the given mail host, if it supports `OAuth2`.
    #[must_use]
    pub fn for_host(host: &str) -> Option<Self> {
        [Self::google(), Self::microsoft(), Self::yahoo()]
            .into_iter()
            .flatten()
            .find(|provider| provider.serves(host))
    }

    /// Returns true if `host` is one of this provider's mail domains or a
    /// subdomain of one. Case and a trailing dot are ignored.
    #[must_use]
    pub fn serves(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        self.mail_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.token_url.scheme() != "https" {
            return Err(Error::InvalidConfig("token_url must use https".into()));
        }
        if self.userinfo_url.scheme() != "https" {
            return Err(Error::InvalidConfig("userinfo_url must use https".into()));
        }
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
    use super::*;

    #[test]
    fn test_google_provider() {
        let provider = Provider::google().unwrap();
        assert_eq!(provider.name, "Google");
        assert!(provider.default_scopes.contains(&"email".to_string()));
        provider.validate().unwrap();
    }

    #[test]
    fn test_microsoft_provider() {
        let provider = Provider::microsoft().unwrap();
        assert_eq!(provider.name, "Microsoft");
        assert_eq!(provider.default_scopes.len(), 4);
        provider.validate().unwrap();
    }

    #[test]
    fn test_yahoo_provider() {
        let provider = Provider::yahoo().unwrap();
        assert_eq!(provider.name, "Yahoo");
        provider.validate().unwrap();
    }

    #[test]
    fn test_by_id() {
        assert_eq!(Provider::by_id("gmail").unwrap().name, "Google");
        assert_eq!(Provider::by_id("Outlook").unwrap().name, "Microsoft");
        assert!(matches!(
            Provider::by_id("tonline"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_for_host() {
        assert_eq!(Provider::for_host("imap.gmail.com").unwrap().name, "Google");
        assert_eq!(Provider::for_host("SMTP.GMAIL.COM.").unwrap().name, "Google");
        assert_eq!(
            Provider::for_host("outlook.office365.com").unwrap().name,
            "Microsoft"
        );
        assert_eq!(
            Provider::for_host("imap.mail.yahoo.com").unwrap().name,
            "Yahoo"
        );
        assert!(Provider::for_host("mail.example.org").is_none());
    }

    #[test]
    fn test_serves_requires_label_boundary() {
        let provider = Provider::google().unwrap();
        assert!(provider.serves("gmail.com"));
        assert!(provider.serves("IMAP.Gmail.com."));
        assert!(!provider.serves("notgmail.com"));
        assert!(!provider.serves("outlook.office365.com"));
    }

    #[test]
    fn test_plain_http_rejected() {
        let provider = Provider::new(
            "Custom",
            "http://auth.example.com/token",
            "https://auth.example.com/userinfo",
        )
        .unwrap();
        assert!(provider.validate().is_err());
    }
}
