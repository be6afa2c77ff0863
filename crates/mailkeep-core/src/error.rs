//! Error types for the core library.

use thiserror::Error;

use crate::account::Protocol;
use crate::crypto::CryptoError;
use crate::storage::StorageError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing a storage key failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encrypting or decrypting the password failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Token acquisition or address lookup failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailkeep_oauth::Error),

    /// A stored value has an unexpected shape.
    #[error("Malformed stored value: {0}")]
    Serde(#[from] serde_json::Error),

    /// The server presented a certificate that differs from the pinned one.
    #[error(
        "The {protocol} server {host} presented a different certificate than the pinned one. \
         The connection was refused; if the server's certificate was changed on purpose, \
         the account has to be set up again."
    )]
    CertificatePinned {
        /// Protocol of the refused connection.
        protocol: Protocol,
        /// Server hostname.
        host: String,
    },

    /// A connection configuration is missing.
    #[error("No {0} settings are configured for this account")]
    IncompleteCredentials(Protocol),

    /// No certificate is stored for the protocol.
    #[error("No certificate has been trusted for {0} yet")]
    NoCertificate(Protocol),

    /// An `OAuth2` operation was requested without an `OAuth2` service.
    #[error("OAuth2 is not configured")]
    OAuthUnavailable,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
