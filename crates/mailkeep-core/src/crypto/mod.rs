//! Password encryption at rest.
//!
//! The credential store only sequences encryption; the cipher itself sits
//! behind [`SecretCodec`]. [`AesGcmCodec`] is the production implementation,
//! keyed by a [`MasterKey`] that lives in the system keyring.

mod aes;
mod master_key;

use async_trait::async_trait;

pub use aes::AesGcmCodec;
pub use master_key::MasterKey;

/// Error type for encryption operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Key material has the wrong size or encoding.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("Encryption failed")]
    Encrypt,

    /// Ciphertext was tampered with or sealed under another key.
    #[error("Decryption failed")]
    Decrypt,

    /// Ciphertext is not valid base64.
    #[error("Malformed ciphertext: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Ciphertext is too short to hold a nonce.
    #[error("Ciphertext is truncated")]
    Truncated,

    /// Plaintext is not valid UTF-8.
    #[error("Decrypted secret is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The caller expected a different key than the codec holds.
    #[error("Secret was sealed with key {expected}, codec holds {actual}")]
    KeyMismatch {
        /// Key id the caller asked for.
        expected: String,
        /// Key id of this codec.
        actual: String,
    },
}

/// Result type for encryption operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Encrypts and decrypts account secrets.
#[async_trait]
pub trait SecretCodec: Send + Sync {
    /// Seals `plaintext` into a storable string.
    async fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;

    /// Opens `ciphertext`. `key_hint` names the key the secret is expected to
    /// be sealed with, if the caller knows it.
    async fn decrypt(&self, ciphertext: &str, key_hint: Option<&str>) -> CryptoResult<String>;
}
