//! Command-line arguments and runtime configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use mailkeep_core::{OAuthService, Protocol};
use mailkeep_oauth::{OAuthClient, Provider, TokenSource};

/// Database file inside the data directory.
const DATABASE_FILE: &str = "credentials.db";

/// Manage mail account credentials and trusted server certificates.
#[derive(Debug, Parser)]
#[command(name = "mailkeep", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store credentials for an account, filling in known provider settings
    Login(LoginArgs),
    /// Print the stored account without secrets
    Show,
    /// Print the SASL initial response for logging in by hand
    Sasl {
        /// imap or smtp
        protocol: Protocol,
    },
    /// Fetch an OAuth2 token and resolve the account address
    Oauth,
    /// Check a server certificate against the trusted one
    Trust {
        /// imap or smtp
        protocol: Protocol,
        /// PEM file with the certificate the server presented
        pem_file: PathBuf,
        /// Accept a changed certificate without asking
        #[arg(long)]
        yes: bool,
    },
    /// Never accept a different certificate for this server
    Pin {
        /// imap or smtp
        protocol: Protocol,
    },
    /// Remove all stored credentials
    Logout {
        /// Also delete the master key from the system keyring
        #[arg(long)]
        forget_key: bool,
    },
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Email address of the account
    pub email: String,

    /// Password; read from stdin when omitted and the account does not use OAuth2
    #[arg(long, env = "MAILKEEP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Login name, defaults to the email address
    #[arg(long)]
    pub username: Option<String>,

    /// Display name for outgoing mail
    #[arg(long)]
    pub realname: Option<String>,

    /// IMAP server (required for providers that are not detected)
    #[arg(long)]
    pub imap_host: Option<String>,

    /// IMAP port
    #[arg(long)]
    pub imap_port: Option<u16>,

    /// SMTP server (required for providers that are not detected)
    #[arg(long)]
    pub smtp_host: Option<String>,

    /// SMTP port
    #[arg(long)]
    pub smtp_port: Option<u16>,

    /// Use STARTTLS instead of implicit TLS for custom servers
    #[arg(long)]
    pub starttls: bool,
}

/// Runtime configuration, from flags with environment fallbacks.
#[derive(Debug, Args)]
pub struct Config {
    /// Directory holding the credential database
    #[arg(long, env = "MAILKEEP_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keyring service the master key is stored under
    #[arg(
        long,
        env = "MAILKEEP_KEYRING_SERVICE",
        default_value = "mailkeep",
        global = true
    )]
    pub keyring_service: String,

    /// OAuth2 provider (gmail, outlook, yahoo); detected from the account
    /// address when omitted
    #[arg(long, env = "MAILKEEP_OAUTH_PROVIDER", global = true)]
    pub oauth_provider: Option<String>,

    /// OAuth2 client id
    #[arg(long, env = "MAILKEEP_OAUTH_CLIENT_ID", global = true)]
    pub oauth_client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(
        long,
        env = "MAILKEEP_OAUTH_CLIENT_SECRET",
        hide_env_values = true,
        global = true
    )]
    pub oauth_client_secret: Option<String>,

    /// OAuth2 refresh token obtained during account setup
    #[arg(
        long,
        env = "MAILKEEP_OAUTH_REFRESH_TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub oauth_refresh_token: Option<String>,
}

impl Config {
    /// Data directory, defaulting to the platform data dir.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("mailkeep"))
            .context("could not determine a data directory, pass --data-dir")
    }

    /// Path of the credential database.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(DATABASE_FILE))
    }

    /// Builds the `OAuth2` service when a client id and refresh token are set.
    ///
    /// With a known account address the service is bound to it, and the
    /// provider defaults to the one hosting the address's domain.
    pub fn oauth_service(&self, email: Option<&str>) -> Result<Option<Arc<dyn OAuthService>>> {
        let (Some(client_id), Some(refresh_token)) =
            (&self.oauth_client_id, &self.oauth_refresh_token)
        else {
            if self.oauth_client_id.is_some() || self.oauth_refresh_token.is_some() {
                bail!("OAuth2 needs both a client id and a refresh token");
            }
            return Ok(None);
        };

        let provider = self.resolve_provider(email)?;
        provider
            .validate()
            .with_context(|| format!("OAuth2 provider {}", provider.name))?;
        let mut client = OAuthClient::new(client_id.clone(), provider);
        if let Some(secret) = &self.oauth_client_secret {
            client = client.with_client_secret(secret.clone());
        }

        let mut source = TokenSource::new(client, refresh_token.clone());
        if let Some(email) = email {
            source = source.bound_to(email);
        }
        let source: Arc<dyn OAuthService> = Arc::new(source);
        Ok(Some(source))
    }

    fn resolve_provider(&self, email: Option<&str>) -> Result<Provider> {
        if let Some(id) = &self.oauth_provider {
            return Provider::by_id(id).with_context(|| format!("unknown OAuth2 provider '{id}'"));
        }
        email
            .and_then(|email| email.rsplit_once('@'))
            .and_then(|(_, domain)| Provider::for_host(domain))
            .context("no OAuth2 provider known for this account, pass --oauth-provider")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_trust_arguments() {
        let cli = Cli::try_parse_from(["mailkeep", "trust", "smtp", "server.pem", "--yes"]).unwrap();
        match cli.command {
            Command::Trust {
                protocol,
                pem_file,
                yes,
            } => {
                assert_eq!(protocol, Protocol::Smtp);
                assert_eq!(pem_file, PathBuf::from("server.pem"));
                assert!(yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_sasl_arguments() {
        let cli = Cli::try_parse_from(["mailkeep", "sasl", "imap"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sasl {
                protocol: Protocol::Imap
            }
        ));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        assert!(Cli::try_parse_from(["mailkeep", "pin", "pop3"]).is_err());
    }

    #[test]
    fn test_database_path() {
        let cli = Cli::try_parse_from(["mailkeep", "--data-dir", "/tmp/mk", "show"]).unwrap();
        assert_eq!(
            cli.config.database_path().unwrap(),
            PathBuf::from("/tmp/mk/credentials.db")
        );
    }

    #[test]
    fn test_oauth_needs_client_and_refresh_token() {
        let cli = Cli::try_parse_from([
            "mailkeep",
            "--oauth-client-id",
            "client",
            "--oauth-refresh-token",
            "refresh",
            "oauth",
        ])
        .unwrap();
        let service = cli.config.oauth_service(Some("bla@gmail.com")).unwrap().unwrap();
        assert!(service.serves("imap.gmail.com"));

        let cli =
            Cli::try_parse_from(["mailkeep", "--oauth-client-id", "client", "oauth"]).unwrap();
        assert!(cli.config.oauth_service(None).is_err());
    }

    #[test]
    fn test_oauth_provider_follows_account_address() {
        let cli = Cli::try_parse_from([
            "mailkeep",
            "--oauth-client-id",
            "client",
            "--oauth-refresh-token",
            "refresh",
            "show",
        ])
        .unwrap();

        let service = cli.config.oauth_service(Some("bla@outlook.com")).unwrap().unwrap();
        assert!(service.serves("outlook.office365.com"));
        assert!(!service.serves("imap.gmail.com"));

        assert!(cli.config.oauth_service(Some("bla@blubb.com")).is_err());
        assert!(cli.config.oauth_service(None).is_err());
    }

    #[test]
    fn test_explicit_oauth_provider_wins() {
        let cli = Cli::try_parse_from([
            "mailkeep",
            "--oauth-provider",
            "yahoo",
            "--oauth-client-id",
            "client",
            "--oauth-refresh-token",
            "refresh",
            "show",
        ])
        .unwrap();

        let service = cli.config.oauth_service(Some("bla@gmail.com")).unwrap().unwrap();
        assert!(service.serves("imap.mail.yahoo.com"));
        assert!(!service.serves("imap.gmail.com"));
    }

    #[tokio::test]
    async fn test_bound_service_refuses_other_address() {
        let cli = Cli::try_parse_from([
            "mailkeep",
            "--oauth-client-id",
            "client",
            "--oauth-refresh-token",
            "refresh",
            "oauth",
        ])
        .unwrap();

        let service = cli.config.oauth_service(Some("bla@gmail.com")).unwrap().unwrap();
        let err = service.get_oauth_token(Some("other@gmail.com")).await;
        assert!(matches!(
            err,
            Err(mailkeep_oauth::Error::AccountMismatch { .. })
        ));
    }
}
