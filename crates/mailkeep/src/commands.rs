//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use mailkeep_core::{
    Account, AesGcmCodec, Auth, ConnectionConfig, Credentials, MasterKey, Protocol,
    ServerCredentials, SqliteDeviceStorage, TrustDecision, TrustPrompt, Verdict,
    validate_account,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::config::{Cli, Command, Config, LoginArgs};

pub async fn run(cli: Cli) -> Result<()> {
    let Cli { config, command } = cli;
    let auth = open(&config).await?;

    match command {
        Command::Login(args) => {
            let mut auth = attach_oauth(auth, &config, Some(&args.email))?;
            login(&mut auth, args).await
        }
        Command::Show => show(&mut load(auth, &config).await?).await,
        Command::Sasl { protocol } => sasl(&mut load(auth, &config).await?, protocol).await,
        Command::Oauth => oauth(&mut load(auth, &config).await?).await,
        Command::Trust {
            protocol,
            pem_file,
            yes,
        } => trust(&mut load(auth, &config).await?, protocol, &pem_file, yes).await,
        Command::Pin { protocol } => pin(&mut load(auth, &config).await?, protocol).await,
        Command::Logout { forget_key } => logout(auth, &config, forget_key).await,
    }
}

async fn open(config: &Config) -> Result<Auth> {
    let data_dir = config.data_dir()?;
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let database = config.database_path()?;
    debug!("Using credential database {}", database.display());
    let storage = SqliteDeviceStorage::new(&database.to_string_lossy())
        .await
        .context("opening credential database")?;

    let key = MasterKey::load_or_create(&config.keyring_service)
        .context("loading master key from the system keyring")?;

    Ok(Auth::new(Arc::new(storage), Arc::new(AesGcmCodec::new(&key))))
}

/// Loads the stored account, then attaches `OAuth2` for its address.
async fn load(mut auth: Auth, config: &Config) -> Result<Auth> {
    auth.load_credentials()
        .await
        .context("loading stored credentials")?;
    let email = auth.account().email_address.clone();
    attach_oauth(auth, config, email.as_deref())
}

/// Attaches the `OAuth2` service, bound to the account address when known.
fn attach_oauth(auth: Auth, config: &Config, email: Option<&str>) -> Result<Auth> {
    Ok(match config.oauth_service(email)? {
        Some(oauth) => auth.with_oauth(oauth),
        None => auth,
    })
}

async fn login(auth: &mut Auth, args: LoginArgs) -> Result<()> {
    let mut account = Account::with_email(&args.email);
    let secure = !args.starttls;
    account.imap = server_config(
        account.imap.take(),
        Protocol::Imap,
        args.imap_host,
        args.imap_port,
        secure,
    );
    account.smtp = server_config(
        account.smtp.take(),
        Protocol::Smtp,
        args.smtp_host,
        args.smtp_port,
        secure,
    );
    if args.username.is_some() {
        account.username = args.username;
    }
    account.realname = args.realname;

    let uses_oauth = account
        .imap
        .as_ref()
        .is_some_and(|imap| auth.use_oauth(&imap.host));
    account.password = match args.password {
        Some(password) => Some(password),
        None if uses_oauth => None,
        None => Some(read_line("Password: ").await?),
    };

    auth.set_credentials(account.into());
    if auth.account().password.is_none() && uses_oauth {
        auth.get_oauth_token()
            .await
            .context("acquiring OAuth2 token")?;
    }

    if let Err(errors) = validate_account(auth.account()) {
        for error in &errors {
            eprintln!("  {}: {}", error.field(), error.message());
        }
        bail!("account settings are incomplete");
    }

    auth.store_credentials()
        .await
        .context("storing credentials")?;
    info!("Stored credentials for {}", args.email);
    println!("Stored credentials for {}", args.email);
    Ok(())
}

async fn show(auth: &mut Auth) -> Result<()> {
    let credentials = auth.get_credentials().await?;
    print!("{}", describe(&credentials));
    Ok(())
}

/// Prints the SASL exchange for logging in by hand, e.g. through
/// `openssl s_client`.
async fn sasl(auth: &mut Auth, protocol: Protocol) -> Result<()> {
    let credentials = auth.get_credentials().await?;
    let login = &credentials.server(protocol).auth;
    let command = match protocol {
        Protocol::Imap => "a1 AUTHENTICATE",
        Protocol::Smtp => "AUTH",
    };
    println!("{command} {} {}", login.sasl_mechanism(), login.sasl_response());
    Ok(())
}

async fn oauth(auth: &mut Auth) -> Result<()> {
    auth.get_oauth_token()
        .await
        .context("acquiring OAuth2 token")?;

    if auth.account().credentials_dirty {
        auth.store_credentials().await?;
    }
    println!(
        "OAuth2 token acquired for {}",
        auth.account().email_address.as_deref().unwrap_or_default()
    );
    Ok(())
}

async fn trust(auth: &mut Auth, protocol: Protocol, pem_file: &Path, yes: bool) -> Result<()> {
    let pem = tokio::fs::read_to_string(pem_file)
        .await
        .with_context(|| format!("reading certificate {}", pem_file.display()))?;

    let resume = || println!("{protocol} certificate trusted, connection may proceed");
    let pending = match auth.handle_certificate_update(protocol, &pem, resume).await? {
        TrustDecision::Trusted => return Ok(()),
        TrustDecision::Pending(pending) => pending,
    };

    let accepted = yes || confirm(pending.prompt()).await?;
    let host = pending.host().to_string();
    match pending.resolve(auth, accepted).await? {
        Verdict::Accepted => Ok(()),
        Verdict::Declined => bail!("new certificate of {protocol} server {host} was not trusted"),
    }
}

async fn pin(auth: &mut Auth, protocol: Protocol) -> Result<()> {
    auth.pin_certificate(protocol).await?;
    println!("{protocol} certificate pinned");
    Ok(())
}

async fn logout(mut auth: Auth, config: &Config, forget_key: bool) -> Result<()> {
    auth.logout().await?;
    if forget_key {
        MasterKey::delete(&config.keyring_service)
            .context("deleting master key from the system keyring")?;
    }
    println!("Logged out");
    Ok(())
}

/// Detected settings, overridden by explicit host and port.
fn server_config(
    detected: Option<ConnectionConfig>,
    protocol: Protocol,
    host: Option<String>,
    port: Option<u16>,
    secure: bool,
) -> Option<ConnectionConfig> {
    match host {
        Some(host) => {
            let port = port.unwrap_or_else(|| protocol.default_port(secure));
            Some(ConnectionConfig::new(host, port, secure))
        }
        None => detected.map(|mut config| {
            if let Some(port) = port {
                config.port = port;
            }
            config
        }),
    }
}

fn describe(credentials: &Credentials) -> String {
    let mut out = format!(
        "Account:  {}",
        credentials.email_address.as_deref().unwrap_or("<unknown>")
    );
    if let Some(realname) = &credentials.realname {
        out.push_str(&format!(" ({realname})"));
    }
    out.push('\n');
    if let Some(provider) = &credentials.provider {
        out.push_str(&format!("Provider: {provider}\n"));
    }
    for protocol in Protocol::ALL {
        out.push_str(&format!(
            "{protocol}:     {}\n",
            describe_server(credentials.server(protocol))
        ));
    }
    out
}

fn describe_server(server: &ServerCredentials) -> String {
    let tls = if server.secure { "TLS" } else { "STARTTLS" };
    let login = server.auth.sasl_mechanism();
    let certificate = match (&server.ca, server.pinned) {
        (None, _) => "not yet trusted",
        (Some(_), false) => "trusted",
        (Some(_), true) => "pinned",
    };
    format!(
        "{}:{} ({tls}), user {}, {login} login, certificate {certificate}",
        server.host, server.port, server.auth.user
    )
}

async fn confirm(prompt: &TrustPrompt) -> Result<bool> {
    println!("{}\n{}", prompt.title, prompt.message);
    let answer = read_line("Trust the new certificate? [y/N] ").await?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn read_line(prompt: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mailkeep_core::ConnectionAuth;

    use super::*;

    fn server(ca: Option<&str>, pinned: bool, token: Option<&str>) -> ServerCredentials {
        ServerCredentials {
            host: "mail.blablubb.com".into(),
            port: 993,
            secure: true,
            ca: ca.map(str::to_string),
            pinned,
            auth: ConnectionAuth {
                user: "bla".into(),
                pass: Some("passwordpasswordpassword".into()),
                xoauth2: token.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_server_config_prefers_explicit_host() {
        let detected = Some(ConnectionConfig::new("imap.gmail.com", 993, true));
        let config =
            server_config(detected, Protocol::Imap, Some("imap.example.org".into()), None, false)
                .unwrap();
        assert_eq!(config.host, "imap.example.org");
        assert_eq!(config.port, 143);
        assert!(!config.secure);
    }

    #[test]
    fn test_server_config_port_override() {
        let detected = Some(ConnectionConfig::new("smtp.gmail.com", 465, true));
        let config = server_config(detected, Protocol::Smtp, None, Some(2465), true).unwrap();
        assert_eq!(config.host, "smtp.gmail.com");
        assert_eq!(config.port, 2465);

        assert!(server_config(None, Protocol::Smtp, None, Some(25), true).is_none());
    }

    #[test]
    fn test_describe_server_hides_secrets() {
        let line = describe_server(&server(Some("PEM"), true, Some("tokentokentokentoken")));
        assert!(line.contains("mail.blablubb.com:993"));
        assert!(line.contains("XOAUTH2 login"));
        assert!(line.contains("pinned"));
        assert!(!line.contains("passwordpasswordpassword"));
        assert!(!line.contains("tokentokentokentoken"));

        let line = describe_server(&server(None, false, None));
        assert!(line.contains("PLAIN login"));
        assert!(line.contains("not yet trusted"));
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES\n"));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }
}
