//! Account model types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mail protocol a connection configuration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Incoming mail.
    Imap,
    /// Outgoing mail.
    Smtp,
}

impl Protocol {
    /// Both protocols, IMAP first.
    pub const ALL: [Self; 2] = [Self::Imap, Self::Smtp];

    /// Lowercase identifier, also used as the storage key of the config.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Smtp => "smtp",
        }
    }

    /// Get default port for the protocol and TLS mode.
    #[must_use]
    pub const fn default_port(self, secure: bool) -> u16 {
        match (self, secure) {
            (Self::Imap, true) => 993,
            (Self::Imap, false) => 143,
            (Self::Smtp, true) => 465,
            (Self::Smtp, false) => 587,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Imap => "IMAP",
            Self::Smtp => "SMTP",
        })
    }
}

/// Error returned when parsing an unknown protocol name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol '{0}', expected 'imap' or 'smtp'")]
pub struct ParseProtocolError(String);

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imap" => Ok(Self::Imap),
            "smtp" => Ok(Self::Smtp),
            _ => Err(ParseProtocolError(s.to_string())),
        }
    }
}

/// Server connection settings as persisted for one protocol.
///
/// Authentication data is not part of the stored shape; it is synthesized
/// from the account when credentials are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Implicit TLS.
    pub secure: bool,
    /// PEM certificate trusted for this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    /// Whether `ca` may never be replaced.
    #[serde(default, skip_serializing_if = "is_false")]
    pub pinned: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // Required by serde skip_serializing_if signature
const fn is_false(value: &bool) -> bool {
    !*value
}

impl ConnectionConfig {
    /// Creates a configuration with no trusted certificate.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
            ca: None,
            pinned: false,
        }
    }

    /// Sets the trusted certificate.
    #[must_use]
    pub fn with_ca(mut self, pem: impl Into<String>) -> Self {
        self.ca = Some(pem.into());
        self
    }

    /// Sets the pinned flag.
    #[must_use]
    pub const fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }
}

/// Email account held in memory for one session.
///
/// `password` holds ciphertext while `password_needs_decryption` is set and
/// plaintext otherwise.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Account {
    /// Email address.
    pub email_address: Option<String>,
    /// Login name.
    pub username: Option<String>,
    /// Display name used in outgoing mail.
    pub realname: Option<String>,
    /// Provider identifier (`gmail`, `outlook`, ...).
    pub provider: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// `OAuth2` access token. Never persisted.
    pub oauth_token: Option<String>,
    /// IMAP configuration.
    pub imap: Option<ConnectionConfig>,
    /// SMTP configuration.
    pub smtp: Option<ConnectionConfig>,
    /// In-memory state differs from what was last stored.
    pub credentials_dirty: bool,
    /// `password` is still the stored ciphertext.
    pub password_needs_decryption: bool,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email_address", &self.email_address)
            .field("username", &self.username)
            .field("realname", &self.realname)
            .field("provider", &self.provider)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "<redacted>"))
            .field("imap", &self.imap)
            .field("smtp", &self.smtp)
            .field("credentials_dirty", &self.credentials_dirty)
            .field("password_needs_decryption", &self.password_needs_decryption)
            .finish()
    }
}

impl Account {
    /// Create a new empty account.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create account with server settings for well-known providers.
    ///
    /// Unknown domains get only the address and username filled in.
    #[must_use]
    pub fn with_email(email: &str) -> Self {
        let mut account = Self {
            email_address: Some(email.to_string()),
            username: Some(email.to_string()),
            ..Self::default()
        };

        let Some(domain) = email.rsplit_once('@').map(|(_, d)| d.to_ascii_lowercase()) else {
            return account;
        };

        let (provider, imap, smtp) = match domain.as_str() {
            "gmail.com" | "googlemail.com" => (
                "gmail",
                ConnectionConfig::new("imap.gmail.com", 993, true),
                ConnectionConfig::new("smtp.gmail.com", 465, true),
            ),
            "outlook.com" | "hotmail.com" | "live.com" => (
                "outlook",
                ConnectionConfig::new("outlook.office365.com", 993, true),
                ConnectionConfig::new("smtp.office365.com", 587, false),
            ),
            "yahoo.com" | "ymail.com" => (
                "yahoo",
                ConnectionConfig::new("imap.mail.yahoo.com", 993, true),
                ConnectionConfig::new("smtp.mail.yahoo.com", 465, true),
            ),
            "icloud.com" | "me.com" | "mac.com" => (
                "icloud",
                ConnectionConfig::new("imap.mail.me.com", 993, true),
                ConnectionConfig::new("smtp.mail.me.com", 587, false),
            ),
            _ => return account,
        };

        account.provider = Some(provider.to_string());
        account.imap = Some(imap);
        account.smtp = Some(smtp);
        account
    }

    /// Returns the configuration for `protocol`.
    #[must_use]
    pub const fn connection(&self, protocol: Protocol) -> Option<&ConnectionConfig> {
        match protocol {
            Protocol::Imap => self.imap.as_ref(),
            Protocol::Smtp => self.smtp.as_ref(),
        }
    }

    /// Returns the configuration for `protocol` mutably.
    pub fn connection_mut(&mut self, protocol: Protocol) -> Option<&mut ConnectionConfig> {
        match protocol {
            Protocol::Imap => self.imap.as_mut(),
            Protocol::Smtp => self.smtp.as_mut(),
        }
    }

    /// Returns true once both connection configurations are known.
    #[must_use]
    pub const fn has_connections(&self) -> bool {
        self.imap.is_some() && self.smtp.is_some()
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

    mod protocol_tests {
        use super::*;

        #[test]
        fn parse() {
            assert_eq!("imap".parse::<Protocol>().unwrap(), Protocol::Imap);
            assert_eq!(" SMTP ".parse::<Protocol>().unwrap(), Protocol::Smtp);
            assert!("pop3".parse::<Protocol>().is_err());
        }

        #[test]
        fn display_and_key() {
            assert_eq!(Protocol::Imap.to_string(), "IMAP");
            assert_eq!(Protocol::Smtp.as_str(), "smtp");
        }

        #[test]
        fn default_ports() {
            assert_eq!(Protocol::Imap.default_port(true), 993);
            assert_eq!(Protocol::Imap.default_port(false), 143);
            assert_eq!(Protocol::Smtp.default_port(true), 465);
            assert_eq!(Protocol::Smtp.default_port(false), 587);
        }
    }

    mod connection_config_tests {
        use super::*;

        #[test]
        fn stored_shape_omits_unset_trust() {
            let config = ConnectionConfig::new("mail.blablubb.com", 123, true);
            let json = serde_json::to_value(&config).unwrap();
            assert_eq!(
                json,
                serde_json::json!({"host": "mail.blablubb.com", "port": 123, "secure": true})
            );
        }

        #[test]
        fn pinned_absent_reads_as_false() {
            let config: ConnectionConfig = serde_json::from_value(serde_json::json!({
                "host": "mail.blablubb.com",
                "port": 456,
                "secure": true,
                "ca": "PEM"
            }))
            .unwrap();
            assert_eq!(config.ca.as_deref(), Some("PEM"));
            assert!(!config.pinned);
        }
    }

    mod account_tests {
        use super::*;

        #[test]
        fn new_creates_empty() {
            let account = Account::new();
            assert!(account.email_address.is_none());
            assert!(!account.has_connections());
            assert!(!account.credentials_dirty);
            assert!(!account.password_needs_decryption);
        }

        #[test]
        fn with_email_gmail() {
            let account = Account::with_email("user@gmail.com");
            assert_eq!(account.provider.as_deref(), Some("gmail"));
            assert_eq!(account.username.as_deref(), Some("user@gmail.com"));
            let imap = account.connection(Protocol::Imap).unwrap();
            assert_eq!(imap.host, "imap.gmail.com");
            assert_eq!(imap.port, 993);
            assert!(imap.secure);
            assert_eq!(account.smtp.as_ref().unwrap().port, 465);
        }

        #[test]
        fn with_email_outlook_uses_starttls_submission() {
            let account = Account::with_email("user@hotmail.com");
            assert_eq!(account.provider.as_deref(), Some("outlook"));
            let smtp = account.connection(Protocol::Smtp).unwrap();
            assert_eq!(smtp.host, "smtp.office365.com");
            assert_eq!(smtp.port, 587);
            assert!(!smtp.secure);
        }

        #[test]
        fn with_email_icloud() {
            let account = Account::with_email("user@me.com");
            assert_eq!(account.provider.as_deref(), Some("icloud"));
            assert_eq!(account.imap.unwrap().host, "imap.mail.me.com");
        }

        #[test]
        fn with_email_unknown_domain() {
            let account = Account::with_email("user@example.org");
            assert!(account.provider.is_none());
            assert!(!account.has_connections());
            assert_eq!(account.username.as_deref(), Some("user@example.org"));
        }

        #[test]
        fn debug_redacts_secrets() {
            let account = Account {
                password: Some("hunter2".into()),
                oauth_token: Some("ya29.secret".into()),
                ..Account::default()
            };
            let debug = format!("{account:?}");
            assert!(!debug.contains("hunter2"));
            assert!(!debug.contains("ya29.secret"));
            assert!(debug.contains("<redacted>"));
        }

        #[test]
        fn connection_mut_targets_protocol() {
            let mut account = Account::with_email("user@gmail.com");
            account.connection_mut(Protocol::Smtp).unwrap().pinned = true;
            assert!(account.smtp.unwrap().pinned);
            assert!(!account.imap.unwrap().pinned);
        }
    }
}
