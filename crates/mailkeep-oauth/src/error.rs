//! Errors raised while obtaining tokens or resolving addresses.

use thiserror::Error;

/// Errors from `OAuth2` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The request did not reach the provider or its body was unreadable.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an `OAuth2` error.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code, e.g. `invalid_grant` for a revoked refresh token.
        error: String,
        /// Provider's explanation, possibly empty.
        description: String,
    },

    /// The token cannot be refreshed.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The provider answered with something unusable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The userinfo document carries no address.
    #[error("Provider returned no email address for this token")]
    MissingEmail,

    /// A token was requested for an address the grant does not belong to.
    #[error("Token belongs to {bound}, not {requested}")]
    AccountMismatch {
        /// Address the refresh token was issued for.
        bound: String,
        /// Address the caller asked for.
        requested: String,
    },

    /// Unknown provider or insecure endpoint.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An endpoint URL does not parse.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Builds an [`Error::OAuth`].
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
