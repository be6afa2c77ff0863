//! Key-value device storage.
//!
//! The credential store talks to storage through [`DeviceStorage`], a
//! list-per-key interface. [`SqliteDeviceStorage`] is the production backend.

mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

pub use sqlite::SqliteDeviceStorage;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Collection-oriented key-value store.
///
/// Every key holds an ordered list of JSON values.
#[async_trait]
pub trait DeviceStorage: Send + Sync {
    /// Lists values stored under `key`, skipping `offset` entries and
    /// returning at most `count` (all when `None`).
    async fn list_items(
        &self,
        key: &str,
        offset: usize,
        count: Option<usize>,
    ) -> StorageResult<Vec<Value>>;

    /// Replaces the list stored under `key` with `values`.
    async fn store_list(&self, values: Vec<Value>, key: &str) -> StorageResult<()>;

    /// Removes everything stored under `key`.
    async fn remove_list(&self, key: &str) -> StorageResult<()>;
}

/// Storage keys of the seven persisted account attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    /// Email address.
    EmailAddress,
    /// Login name.
    Username,
    /// Display name.
    Realname,
    /// Encrypted password.
    Password,
    /// Provider identifier.
    Provider,
    /// IMAP connection config.
    Imap,
    /// SMTP connection config.
    Smtp,
}

impl CredentialKey {
    /// All keys, in the order they are written.
    pub const ALL: [Self; 7] = [
        Self::EmailAddress,
        Self::Username,
        Self::Realname,
        Self::Password,
        Self::Provider,
        Self::Imap,
        Self::Smtp,
    ];

    /// Storage key string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmailAddress => "emailaddress",
            Self::Username => "username",
            Self::Realname => "realname",
            Self::Password => "password",
            Self::Provider => "provider",
            Self::Imap => "imap",
            Self::Smtp => "smtp",
        }
    }
}
