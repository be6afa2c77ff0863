//! # mailkeep-core
//!
//! Credential and trust management for a mail client session.
//!
//! This crate provides:
//! - **Credential store** - load, decrypt, update and persist the seven
//!   account attributes through a key-value [`DeviceStorage`]
//! - **Password encryption** - passwords are stored sealed by a
//!   [`SecretCodec`]; [`AesGcmCodec`] keys it from the system keyring
//! - **`OAuth2` resolution** - access tokens (and, when unknown, the account
//!   address) for provider-hosted accounts
//! - **Certificate trust** - trust-on-first-use with user confirmation on
//!   change and optional pinning
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailkeep_core::{AesGcmCodec, Auth, MasterKey, SqliteDeviceStorage};
//!
//! let storage = Arc::new(SqliteDeviceStorage::new("credentials.db").await?);
//! let codec = Arc::new(AesGcmCodec::new(&MasterKey::load_or_create("mailkeep")?));
//! let mut auth = Auth::new(storage, codec);
//!
//! let credentials = auth.get_credentials().await?;
//! println!("IMAP login for {}", credentials.imap.auth.user);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod auth;
pub mod crypto;
mod error;
pub mod oauth;
pub mod storage;

#[cfg(test)]
mod testing;

pub use account::{
    Account, ConnectionAuth, ConnectionConfig, Credentials, Protocol, ServerCredentials,
    ValidationError, ValidationResult, validate_account,
};
pub use auth::{Auth, CredentialsUpdate, PendingTrust, TrustDecision, TrustPrompt, Verdict};
pub use crypto::{AesGcmCodec, CryptoError, MasterKey, SecretCodec};
pub use error::{Error, Result};
pub use oauth::OAuthService;
pub use storage::{CredentialKey, DeviceStorage, SqliteDeviceStorage, StorageError};
