//! Connection-ready credential views.
//!
//! These are built on demand from an [`Account`] and never stored: the
//! `auth` part of each server entry is synthesized from the account's
//! username, password and `OAuth2` token.

use std::fmt;

use mailkeep_oauth::sasl;

use super::model::{Account, ConnectionConfig, Protocol};

/// Authentication material for one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionAuth {
    /// Login name.
    pub user: String,
    /// Password, if the account uses one.
    pub pass: Option<String>,
    /// `OAuth2` access token, if the account uses one.
    pub xoauth2: Option<String>,
}

impl ConnectionAuth {
    /// SASL mechanism matching [`Self::sasl_response`].
    #[must_use]
    pub const fn sasl_mechanism(&self) -> &'static str {
        if self.xoauth2.is_some() { "XOAUTH2" } else { "PLAIN" }
    }

    /// Builds the SASL initial response the transport should send.
    ///
    /// Token accounts authenticate with XOAUTH2, everything else with PLAIN.
    #[must_use]
    pub fn sasl_response(&self) -> String {
        match &self.xoauth2 {
            Some(token) => sasl::xoauth2_response(&self.user, token),
            None => sasl::plain_response(&self.user, self.pass.as_deref().unwrap_or_default()),
        }
    }
}

impl fmt::Debug for ConnectionAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionAuth")
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "<redacted>"))
            .field("xoauth2", &self.xoauth2.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything the transport needs to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCredentials {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Implicit TLS.
    pub secure: bool,
    /// Trusted certificate (PEM).
    pub ca: Option<String>,
    /// Whether the certificate is pinned.
    pub pinned: bool,
    /// Authentication material.
    pub auth: ConnectionAuth,
}

impl ServerCredentials {
    fn from_config(config: &ConnectionConfig, auth: ConnectionAuth) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            secure: config.secure,
            ca: config.ca.clone(),
            pinned: config.pinned,
            auth,
        }
    }
}

/// Decrypted credentials for a complete account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Email address.
    pub email_address: Option<String>,
    /// Login name.
    pub username: Option<String>,
    /// Display name.
    pub realname: Option<String>,
    /// Provider identifier.
    pub provider: Option<String>,
    /// IMAP server and login.
    pub imap: ServerCredentials,
    /// SMTP server and login.
    pub smtp: ServerCredentials,
}

impl Credentials {
    /// Builds the view from an account whose password is already plaintext.
    ///
    /// Returns the missing protocol if either configuration is absent.
    pub(crate) fn from_account(account: &Account) -> Result<Self, Protocol> {
        let imap = account.imap.as_ref().ok_or(Protocol::Imap)?;
        let smtp = account.smtp.as_ref().ok_or(Protocol::Smtp)?;

        let auth = ConnectionAuth {
            user: account
                .username
                .clone()
                .or_else(|| account.email_address.clone())
                .unwrap_or_default(),
            pass: account.password.clone(),
            xoauth2: account.oauth_token.clone(),
        };

        Ok(Self {
            email_address: account.email_address.clone(),
            username: account.username.clone(),
            realname: account.realname.clone(),
            provider: account.provider.clone(),
            imap: ServerCredentials::from_config(imap, auth.clone()),
            smtp: ServerCredentials::from_config(smtp, auth),
        })
    }

    /// Returns the server entry for `protocol`.
    #[must_use]
    pub const fn server(&self, protocol: Protocol) -> &ServerCredentials {
        match protocol {
            Protocol::Imap => &self.imap,
            Protocol::Smtp => &self.smtp,
        }
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

    fn account() -> Account {
        Account {
            email_address: Some("bla@blubb.com".into()),
            username: Some("bla".into()),
            password: Some("passwordpasswordpassword".into()),
            imap: Some(ConnectionConfig::new("mail.blablubb.com", 123, true).with_ca("PEM")),
            smtp: Some(ConnectionConfig::new("mail.blablubb.com", 456, true)),
            ..Account::default()
        }
    }

    #[test]
    fn test_auth_is_synthesized_per_server() {
        let credentials = Credentials::from_account(&account()).unwrap();
        assert_eq!(credentials.imap.port, 123);
        assert_eq!(credentials.imap.ca.as_deref(), Some("PEM"));
        assert_eq!(credentials.smtp.port, 456);
        assert_eq!(credentials.imap.auth.user, "bla");
        assert_eq!(
            credentials.smtp.auth.pass.as_deref(),
            Some("passwordpasswordpassword")
        );
    }

    #[test]
    fn test_missing_config_is_reported() {
        let mut account = account();
        account.smtp = None;
        assert_eq!(Credentials::from_account(&account), Err(Protocol::Smtp));
    }

    #[test]
    fn test_user_falls_back_to_address() {
        let mut account = account();
        account.username = None;
        let credentials = Credentials::from_account(&account).unwrap();
        assert_eq!(credentials.server(Protocol::Imap).auth.user, "bla@blubb.com");
    }

    #[test]
    fn test_sasl_prefers_token() {
        let mut account = account();
        account.oauth_token = Some("tok".into());
        let credentials = Credentials::from_account(&account).unwrap();
        assert_eq!(credentials.imap.auth.sasl_mechanism(), "XOAUTH2");
        assert_eq!(
            credentials.imap.auth.sasl_response(),
            sasl::xoauth2_response("bla", "tok")
        );

        account.oauth_token = None;
        let credentials = Credentials::from_account(&account).unwrap();
        assert_eq!(credentials.imap.auth.sasl_mechanism(), "PLAIN");
        assert_eq!(
            credentials.imap.auth.sasl_response(),
            sasl::plain_response("bla", "passwordpasswordpassword")
        );
    }
}
