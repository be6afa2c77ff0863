//! Account validation.

use super::model::{Account, ConnectionConfig};

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email address is empty.
    EmptyEmail,
    /// Email address format is invalid.
    InvalidEmail,
    /// Username is empty.
    EmptyUsername,
    /// Neither a password nor an `OAuth2` token is available.
    MissingSecret,
    /// IMAP configuration is absent.
    MissingImapConfig,
    /// IMAP host is empty.
    EmptyImapHost,
    /// IMAP port is invalid.
    InvalidImapPort,
    /// SMTP configuration is absent.
    MissingSmtpConfig,
    /// SMTP host is empty.
    EmptySmtpHost,
    /// SMTP port is invalid.
    InvalidSmtpPort,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyEmail => "Email address is required",
            Self::InvalidEmail => "Invalid email address format",
            Self::EmptyUsername => "Username is required",
            Self::MissingSecret => "A password or OAuth2 login is required",
            Self::MissingImapConfig => "IMAP settings are required",
            Self::EmptyImapHost => "IMAP server is required",
            Self::InvalidImapPort => "IMAP port must be 1-65535",
            Self::MissingSmtpConfig => "SMTP settings are required",
            Self::EmptySmtpHost => "SMTP server is required",
            Self::InvalidSmtpPort => "SMTP port must be 1-65535",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyEmail | Self::InvalidEmail => "email_address",
            Self::EmptyUsername => "username",
            Self::MissingSecret => "password",
            Self::MissingImapConfig | Self::EmptyImapHost | Self::InvalidImapPort => "imap",
            Self::MissingSmtpConfig | Self::EmptySmtpHost | Self::InvalidSmtpPort => "smtp",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account before it is stored or used to connect.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &Account) -> ValidationResult {
    let mut errors = Vec::new();

    match account.email_address.as_deref().map(str::trim) {
        None | Some("") => errors.push(ValidationError::EmptyEmail),
        Some(email) if !is_valid_email(email) => errors.push(ValidationError::InvalidEmail),
        Some(_) => {}
    }

    if account.username.as_deref().is_none_or(|u| u.trim().is_empty()) {
        errors.push(ValidationError::EmptyUsername);
    }

    let has_password = account.password.as_deref().is_some_and(|p| !p.is_empty());
    if !has_password && account.oauth_token.is_none() {
        errors.push(ValidationError::MissingSecret);
    }

    check_server(
        account.imap.as_ref(),
        &mut errors,
        [
            ValidationError::MissingImapConfig,
            ValidationError::EmptyImapHost,
            ValidationError::InvalidImapPort,
        ],
    );
    check_server(
        account.smtp.as_ref(),
        &mut errors,
        [
            ValidationError::MissingSmtpConfig,
            ValidationError::EmptySmtpHost,
            ValidationError::InvalidSmtpPort,
        ],
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Pushes `missing`, `empty_host` or `bad_port` as they apply.
fn check_server(
    config: Option<&ConnectionConfig>,
    errors: &mut Vec<ValidationError>,
    [missing, empty_host, bad_port]: [ValidationError; 3],
) {
    let Some(config) = config else {
        errors.push(missing);
        return;
    };
    if config.host.trim().is_empty() {
        errors.push(empty_host);
    }
    if config.port == 0 {
        errors.push(bad_port);
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    // Domain needs at least two non-empty labels
    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
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
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@example.com"));
        assert!(is_valid_email("user@sub.example.com"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@example..com"));
    }

    #[test]
    fn test_validate_empty_account() {
        let errors = validate_account(&Account::new()).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyEmail));
        assert!(errors.contains(&ValidationError::EmptyUsername));
        assert!(errors.contains(&ValidationError::MissingSecret));
        assert!(errors.contains(&ValidationError::MissingImapConfig));
        assert!(errors.contains(&ValidationError::MissingSmtpConfig));
    }

    #[test]
    fn test_validate_complete_account() {
        let mut account = Account::with_email("test@gmail.com");
        account.password = Some("secret".to_string());
        assert!(validate_account(&account).is_ok());
    }

    #[test]
    fn test_token_replaces_password() {
        let mut account = Account::with_email("test@gmail.com");
        account.oauth_token = Some("tok".to_string());
        assert!(validate_account(&account).is_ok());
    }

    #[test]
    fn test_bad_server_fields() {
        let mut account = Account::with_email("test@gmail.com");
        account.password = Some("secret".to_string());
        if let Some(imap) = account.imap.as_mut() {
            imap.host = "  ".to_string();
            imap.port = 0;
        }
        let errors = validate_account(&account).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::EmptyImapHost, ValidationError::InvalidImapPort]
        );
        assert_eq!(errors[0].field(), "imap");
    }
}
