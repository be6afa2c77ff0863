//! Session credentials: loading, storing, encryption bookkeeping, `OAuth2`
//! resolution and certificate trust.
//!
//! [`Auth`] owns the session [`Account`]. All operations take `&mut self`,
//! so one account is never mutated by two operations at once.
//!
//! Passwords cross the storage boundary only in sealed form: they are
//! decrypted lazily on the first [`Auth::get_credentials`] after a load and
//! encrypted on [`Auth::store_credentials`] when the account is dirty.

mod oauth;
mod trust;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::account::{Account, ConnectionConfig, Credentials};
use crate::crypto::SecretCodec;
use crate::error::{Error, Result};
use crate::oauth::OAuthService;
use crate::storage::{CredentialKey, DeviceStorage};

pub use trust::{PendingTrust, TrustDecision, TrustPrompt, Verdict};

/// Fields to overwrite with [`Auth::set_credentials`]. `None` leaves the
/// current value untouched.
#[derive(Clone, Default)]
pub struct CredentialsUpdate {
    /// Email address.
    pub email_address: Option<String>,
    /// Login name.
    pub username: Option<String>,
    /// Display name.
    pub realname: Option<String>,
    /// Provider identifier.
    pub provider: Option<String>,
    /// Plaintext password.
    pub password: Option<String>,
    /// IMAP configuration.
    pub imap: Option<ConnectionConfig>,
    /// SMTP configuration.
    pub smtp: Option<ConnectionConfig>,
}

impl From<Account> for CredentialsUpdate {
    fn from(account: Account) -> Self {
        Self {
            email_address: account.email_address,
            username: account.username,
            realname: account.realname,
            provider: account.provider,
            password: account.password,
            imap: account.imap,
            smtp: account.smtp,
        }
    }
}

/// Credential and trust manager for one account session.
pub struct Auth {
    storage: Arc<dyn DeviceStorage>,
    codec: Arc<dyn SecretCodec>,
    oauth: Option<Arc<dyn OAuthService>>,
    account: Account,
    /// Ciphertext matching the plaintext password, reused while not dirty.
    sealed_password: Option<String>,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("account", &self.account)
            .field("oauth", &self.oauth.is_some())
            .finish_non_exhaustive()
    }
}

impl Auth {
    /// Creates a session with an empty account.
    #[must_use]
    pub fn new(storage: Arc<dyn DeviceStorage>, codec: Arc<dyn SecretCodec>) -> Self {
        Self {
            storage,
            codec,
            oauth: None,
            account: Account::default(),
            sealed_password: None,
        }
    }

    /// Enables `OAuth2` for providers that support it.
    #[must_use]
    pub fn with_oauth(mut self, oauth: Arc<dyn OAuthService>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// The session account.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// Returns true if `host` should be logged into with an `OAuth2` token,
    /// i.e. the configured service belongs to the provider running `host`.
    #[must_use]
    pub fn use_oauth(&self, host: &str) -> bool {
        self.oauth.as_ref().is_some_and(|oauth| oauth.serves(host))
    }

    /// Overwrites the fields present in `update` and marks the account dirty.
    pub fn set_credentials(&mut self, update: CredentialsUpdate) {
        let account = &mut self.account;

        account.email_address = update.email_address.or(account.email_address.take());
        account.username = update.username.or(account.username.take());
        account.realname = update.realname.or(account.realname.take());
        account.provider = update.provider.or(account.provider.take());
        account.imap = update.imap.or(account.imap.take());
        account.smtp = update.smtp.or(account.smtp.take());

        if let Some(password) = update.password {
            account.password = Some(password);
            account.password_needs_decryption = false;
            self.sealed_password = None;
        }

        account.credentials_dirty = true;
    }

    /// Returns connection-ready credentials, loading and decrypting as needed.
    ///
    /// Storage is read only when the account has no connection settings in
    /// memory yet and holds no unsaved changes; an incomplete dirty account is
    /// reported instead of being overwritten. The password is decrypted at
    /// most once per load. When the
    /// IMAP host belongs to an `OAuth2` provider and no password is held, a
    /// token is fetched.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, decryption or token acquisition fails, or
    /// if either connection configuration is missing afterwards.
    pub async fn get_credentials(&mut self) -> Result<Credentials> {
        if !self.account.has_connections() && !self.account.credentials_dirty {
            self.load_credentials().await?;
        }

        self.decrypt_password().await?;

        let wants_token = self.account.password.is_none()
            && self.account.oauth_token.is_none()
            && self
                .account
                .imap
                .as_ref()
                .is_some_and(|imap| self.use_oauth(&imap.host));
        if wants_token {
            self.get_oauth_token().await?;
        }

        Credentials::from_account(&self.account).map_err(Error::IncompleteCredentials)
    }

    /// Reads all seven credential keys into the account.
    ///
    /// The reads are issued together and the call completes once every one
    /// has resolved. The account is only touched if all reads succeed; the
    /// loaded password is kept sealed until [`Self::get_credentials`].
    ///
    /// # Errors
    ///
    /// Returns the first storage or decoding error.
    pub async fn load_credentials(&mut self) -> Result<()> {
        let storage = self.storage.as_ref();
        let (email_address, username, realname, password, provider, imap, smtp) = tokio::join!(
            read_value::<String>(storage, CredentialKey::EmailAddress),
            read_value::<String>(storage, CredentialKey::Username),
            read_value::<String>(storage, CredentialKey::Realname),
            read_value::<String>(storage, CredentialKey::Password),
            read_value::<String>(storage, CredentialKey::Provider),
            read_value::<ConnectionConfig>(storage, CredentialKey::Imap),
            read_value::<ConnectionConfig>(storage, CredentialKey::Smtp),
        );

        let loaded = Account {
            email_address: email_address?,
            username: username?,
            realname: realname?,
            password: password?,
            provider: provider?,
            imap: imap?,
            smtp: smtp?,
            oauth_token: self.account.oauth_token.take(),
            credentials_dirty: false,
            password_needs_decryption: true,
        };

        debug!(
            "Loaded credentials for {}",
            loaded.email_address.as_deref().unwrap_or("<unknown>")
        );
        self.account = loaded;
        self.sealed_password = None;
        Ok(())
    }

    /// Persists all seven credential keys, one `store_list` per key.
    ///
    /// The password is encrypted first when the account is dirty; otherwise
    /// the ciphertext from the last load or store is written again.
    ///
    /// # Errors
    ///
    /// Returns the encryption error or the first failing write; remaining
    /// writes are skipped and the account stays dirty.
    pub async fn store_credentials(&mut self) -> Result<()> {
        let sealed = self.seal_password().await?;

        let account = &self.account;
        let entries = [
            (CredentialKey::EmailAddress, string_list(account.email_address.as_ref())),
            (CredentialKey::Username, string_list(account.username.as_ref())),
            (CredentialKey::Realname, string_list(account.realname.as_ref())),
            (CredentialKey::Password, string_list(sealed.as_ref())),
            (CredentialKey::Provider, string_list(account.provider.as_ref())),
            (CredentialKey::Imap, config_list(account.imap.as_ref())?),
            (CredentialKey::Smtp, config_list(account.smtp.as_ref())?),
        ];

        for (key, values) in entries {
            self.storage.store_list(values, key.as_str()).await?;
        }

        if !self.account.password_needs_decryption {
            self.sealed_password = sealed;
        }
        self.account.credentials_dirty = false;
        debug!("Stored credentials");
        Ok(())
    }

    /// Removes all stored credentials and resets the session account.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; the in-memory account is kept in
    /// that case.
    pub async fn logout(&mut self) -> Result<()> {
        for key in CredentialKey::ALL {
            self.storage.remove_list(key.as_str()).await?;
        }
        self.account = Account::default();
        self.sealed_password = None;
        info!("Logged out, stored credentials removed");
        Ok(())
    }

    /// Replaces the loaded ciphertext with plaintext, once per load.
    async fn decrypt_password(&mut self) -> Result<()> {
        if !self.account.password_needs_decryption {
            return Ok(());
        }

        if let Some(sealed) = &self.account.password {
            let plaintext = self.codec.decrypt(sealed, None).await?;
            self.sealed_password = self.account.password.replace(plaintext);
            debug!("Decrypted stored password");
        }
        self.account.password_needs_decryption = false;
        Ok(())
    }

    /// Returns the password in the form it is persisted.
    async fn seal_password(&self) -> Result<Option<String>> {
        let Some(password) = &self.account.password else {
            return Ok(None);
        };

        // still the ciphertext from storage
        if self.account.password_needs_decryption {
            return Ok(Some(password.clone()));
        }

        if !self.account.credentials_dirty
            && let Some(sealed) = &self.sealed_password
        {
            return Ok(Some(sealed.clone()));
        }

        Ok(Some(self.codec.encrypt(password).await?))
    }
}

/// Reads the first value stored under `key`; an empty list or `null` means unset.
async fn read_value<T: DeserializeOwned>(
    storage: &dyn DeviceStorage,
    key: CredentialKey,
) -> Result<Option<T>> {
    let values = storage.list_items(key.as_str(), 0, None).await?;
    let value = values
        .into_iter()
        .next()
        .filter(|value| !value.is_null())
        .map(serde_json::from_value)
        .transpose()?;
    Ok(value)
}

fn string_list(value: Option<&String>) -> Vec<Value> {
    value.map(|s| Value::String(s.clone())).into_iter().collect()
}

fn config_list(config: Option<&ConnectionConfig>) -> Result<Vec<Value>> {
    Ok(config
        .map(serde_json::to_value)
        .transpose()?
        .into_iter()
        .collect())
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
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::testing::{
        EMAIL_ADDRESS, ENCRYPTED_PASSWORD, FakeCodec, FakeStorage, PASSWORD, PROVIDER, REALNAME,
        USERNAME, imap_config, seeded_storage, smtp_config,
    };

    fn auth(storage: &Arc<FakeStorage>, codec: &Arc<FakeCodec>) -> Auth {
        Auth::new(storage.clone(), codec.clone())
    }

    fn full_update() -> CredentialsUpdate {
        CredentialsUpdate {
            email_address: Some(EMAIL_ADDRESS.into()),
            username: Some(USERNAME.into()),
            realname: Some(REALNAME.into()),
            provider: Some(PROVIDER.into()),
            password: Some(PASSWORD.into()),
            imap: Some(imap_config()),
            smtp: Some(smtp_config()),
        }
    }

    mod get_credentials_tests {
        use super::*;

        #[tokio::test]
        async fn loads_and_decrypts() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            let credentials = auth.get_credentials().await.unwrap();

            assert_eq!(auth.account().provider.as_deref(), Some(PROVIDER));
            assert_eq!(auth.account().email_address.as_deref(), Some(EMAIL_ADDRESS));
            assert_eq!(auth.account().password.as_deref(), Some(PASSWORD));

            assert_eq!(credentials.imap.host, imap_config().host);
            assert_eq!(credentials.imap.port, 123);
            assert!(credentials.imap.secure);
            assert_eq!(credentials.imap.ca, imap_config().ca);
            assert_eq!(credentials.imap.auth.user, USERNAME);
            assert_eq!(credentials.imap.auth.pass.as_deref(), Some(PASSWORD));

            assert_eq!(credentials.smtp.port, 456);
            assert_eq!(credentials.smtp.auth.user, USERNAME);
            assert_eq!(credentials.smtp.auth.pass.as_deref(), Some(PASSWORD));

            assert_eq!(storage.list_calls(), 7);
            assert_eq!(codec.decrypt_calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn decrypts_only_once() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            let first = auth.get_credentials().await.unwrap();
            let second = auth.get_credentials().await.unwrap();

            assert_eq!(first, second);
            assert_eq!(codec.decrypt_calls.load(Ordering::SeqCst), 1);
            assert_eq!(storage.list_calls(), 7);
        }

        #[tokio::test]
        async fn decrypt_failure_allows_retry() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            codec.fail.store(true, Ordering::SeqCst);
            let mut auth = auth(&storage, &codec);

            let err = auth.get_credentials().await.unwrap_err();
            assert!(matches!(err, Error::Crypto(_)));
            assert!(auth.account().password_needs_decryption);
            assert_eq!(auth.account().password.as_deref(), Some(ENCRYPTED_PASSWORD));

            codec.fail.store(false, Ordering::SeqCst);
            let credentials = auth.get_credentials().await.unwrap();
            assert_eq!(credentials.imap.auth.pass.as_deref(), Some(PASSWORD));
        }

        #[tokio::test]
        async fn missing_settings_are_reported() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            let err = auth.get_credentials().await.unwrap_err();
            assert!(matches!(err, Error::IncompleteCredentials(_)));
            assert_eq!(codec.decrypt_calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn in_memory_credentials_skip_storage() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.set_credentials(full_update());

            let credentials = auth.get_credentials().await.unwrap();

            assert_eq!(credentials.email_address.as_deref(), Some(EMAIL_ADDRESS));
            assert_eq!(storage.list_calls(), 0);
            assert_eq!(codec.decrypt_calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn unsaved_partial_edit_is_not_overwritten() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            auth.set_credentials(CredentialsUpdate {
                realname: Some("Unsaved Name".into()),
                password: Some("new-plain".into()),
                imap: Some(imap_config()),
                ..CredentialsUpdate::default()
            });

            let err = auth.get_credentials().await.unwrap_err();
            assert!(matches!(err, Error::IncompleteCredentials(_)));

            let account = auth.account();
            assert!(account.credentials_dirty);
            assert_eq!(account.realname.as_deref(), Some("Unsaved Name"));
            assert_eq!(account.password.as_deref(), Some("new-plain"));
            assert!(account.smtp.is_none());
            assert_eq!(storage.list_calls(), 0);
            assert_eq!(codec.decrypt_calls.load(Ordering::SeqCst), 0);

            auth.set_credentials(CredentialsUpdate {
                smtp: Some(smtp_config()),
                ..CredentialsUpdate::default()
            });
            let credentials = auth.get_credentials().await.unwrap();
            assert_eq!(credentials.imap.auth.pass.as_deref(), Some("new-plain"));
            assert_eq!(credentials.realname.as_deref(), Some("Unsaved Name"));
        }
    }

    mod set_credentials_tests {
        use super::*;

        #[test]
        fn sets_all_fields_and_dirty_flag() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            auth.set_credentials(CredentialsUpdate {
                provider: Some("albhsvadlbvsdalbsadflb".into()),
                ..full_update()
            });

            let account = auth.account();
            assert_eq!(account.provider.as_deref(), Some("albhsvadlbvsdalbsadflb"));
            assert_eq!(account.email_address.as_deref(), Some(EMAIL_ADDRESS));
            assert_eq!(account.username.as_deref(), Some(USERNAME));
            assert_eq!(account.realname.as_deref(), Some(REALNAME));
            assert_eq!(account.password.as_deref(), Some(PASSWORD));
            assert_eq!(account.imap, Some(imap_config()));
            assert_eq!(account.smtp, Some(smtp_config()));
            assert!(account.credentials_dirty);
            assert!(!account.password_needs_decryption);
        }

        #[test]
        fn partial_update_keeps_other_fields() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.set_credentials(full_update());

            auth.set_credentials(CredentialsUpdate {
                realname: Some("Someone Else".into()),
                ..CredentialsUpdate::default()
            });

            assert_eq!(auth.account().realname.as_deref(), Some("Someone Else"));
            assert_eq!(auth.account().username.as_deref(), Some(USERNAME));
            assert_eq!(auth.account().password.as_deref(), Some(PASSWORD));
        }

        #[tokio::test]
        async fn plaintext_password_clears_needs_decryption() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.load_credentials().await.unwrap();
            assert!(auth.account().password_needs_decryption);

            auth.set_credentials(CredentialsUpdate {
                password: Some("new password".into()),
                ..CredentialsUpdate::default()
            });

            assert!(!auth.account().password_needs_decryption);
            let credentials = auth.get_credentials().await.unwrap();
            assert_eq!(credentials.imap.auth.pass.as_deref(), Some("new password"));
            assert_eq!(codec.decrypt_calls.load(Ordering::SeqCst), 0);
        }
    }

    mod store_credentials_tests {
        use super::*;

        #[tokio::test]
        async fn persists_all_keys() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.set_credentials(full_update());

            auth.store_credentials().await.unwrap();

            assert_eq!(storage.store_calls(), 7);
            for key in CredentialKey::ALL {
                assert_eq!(storage.store_calls_for(key.as_str()), 1, "{key:?}");
            }
            assert_eq!(codec.encrypt_calls.load(Ordering::SeqCst), 1);
            assert_eq!(storage.stored("password"), vec![json!(ENCRYPTED_PASSWORD)]);
            assert_eq!(storage.stored("emailaddress"), vec![json!(EMAIL_ADDRESS)]);
            assert_eq!(
                storage.stored("imap"),
                vec![serde_json::to_value(imap_config()).unwrap()]
            );
            assert!(!auth.account().credentials_dirty);
        }

        #[tokio::test]
        async fn never_writes_plaintext_password() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.set_credentials(full_update());

            auth.store_credentials().await.unwrap();

            assert_ne!(storage.stored("password"), vec![json!(PASSWORD)]);
        }

        #[tokio::test]
        async fn clean_account_skips_encryption() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.set_credentials(full_update());
            auth.store_credentials().await.unwrap();

            auth.store_credentials().await.unwrap();

            assert_eq!(codec.encrypt_calls.load(Ordering::SeqCst), 1);
            assert_eq!(storage.store_calls(), 14);
            assert_eq!(storage.stored("password"), vec![json!(ENCRYPTED_PASSWORD)]);
        }

        #[tokio::test]
        async fn loaded_ciphertext_is_not_encrypted_twice() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.load_credentials().await.unwrap();
            auth.set_credentials(CredentialsUpdate {
                realname: Some("Renamed".into()),
                ..CredentialsUpdate::default()
            });

            auth.store_credentials().await.unwrap();

            assert_eq!(codec.encrypt_calls.load(Ordering::SeqCst), 0);
            assert_eq!(storage.stored("password"), vec![json!(ENCRYPTED_PASSWORD)]);
        }

        #[tokio::test]
        async fn decrypted_clean_account_rewrites_ciphertext() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.get_credentials().await.unwrap();

            auth.store_credentials().await.unwrap();

            assert_eq!(codec.encrypt_calls.load(Ordering::SeqCst), 0);
            assert_eq!(storage.stored("password"), vec![json!(ENCRYPTED_PASSWORD)]);
        }

        #[tokio::test]
        async fn write_failure_stops_and_keeps_dirty() {
            let storage = Arc::new(FakeStorage::default());
            storage.fail_writes_on("realname");
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.set_credentials(full_update());

            let err = auth.store_credentials().await.unwrap_err();

            assert!(matches!(err, Error::Storage(_)));
            assert!(auth.account().credentials_dirty);
            assert_eq!(storage.store_calls_for("password"), 0);
            assert_eq!(storage.store_calls_for("smtp"), 0);
        }

        #[tokio::test]
        async fn encrypt_failure_writes_nothing() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            codec.fail.store(true, Ordering::SeqCst);
            let mut auth = auth(&storage, &codec);
            auth.set_credentials(full_update());

            let err = auth.store_credentials().await.unwrap_err();

            assert!(matches!(err, Error::Crypto(_)));
            assert_eq!(storage.store_calls(), 0);
            assert!(auth.account().credentials_dirty);
        }

        #[tokio::test]
        async fn round_trip_through_fresh_session() {
            let storage = Arc::new(FakeStorage::default());
            let codec = Arc::new(FakeCodec::default());
            let mut writer = auth(&storage, &codec);
            writer.set_credentials(full_update());
            writer.store_credentials().await.unwrap();
            let written = writer.get_credentials().await.unwrap();

            let mut reader = auth(&storage, &codec);
            let read = reader.get_credentials().await.unwrap();

            assert_eq!(written, read);
        }
    }

    mod load_credentials_tests {
        use super::*;

        #[tokio::test]
        async fn keeps_password_sealed() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            auth.load_credentials().await.unwrap();

            let account = auth.account();
            assert_eq!(account.email_address.as_deref(), Some(EMAIL_ADDRESS));
            assert_eq!(account.password.as_deref(), Some(ENCRYPTED_PASSWORD));
            assert_eq!(account.provider.as_deref(), Some(PROVIDER));
            assert_eq!(account.imap, Some(imap_config()));
            assert_eq!(account.smtp, Some(smtp_config()));
            assert_eq!(account.username.as_deref(), Some(USERNAME));
            assert_eq!(account.realname.as_deref(), Some(REALNAME));
            assert!(account.password_needs_decryption);
            assert!(!account.credentials_dirty);
            assert_eq!(storage.list_calls(), 7);
            assert_eq!(codec.decrypt_calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn failure_leaves_account_empty() {
            let storage = Arc::new(seeded_storage());
            storage.fail_reads.store(true, Ordering::SeqCst);
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            let err = auth.load_credentials().await.unwrap_err();

            assert!(matches!(err, Error::Storage(_)));
            assert_eq!(auth.account(), &Account::default());
        }

        #[tokio::test]
        async fn tolerates_extra_elements() {
            let storage = Arc::new(seeded_storage());
            storage.seed("username", vec![json!(USERNAME), json!("ignored")]);
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            auth.load_credentials().await.unwrap();

            assert_eq!(auth.account().username.as_deref(), Some(USERNAME));
        }

        #[tokio::test]
        async fn malformed_config_is_an_error() {
            let storage = Arc::new(seeded_storage());
            storage.seed("imap", vec![json!("not a config")]);
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);

            let err = auth.load_credentials().await.unwrap_err();

            assert!(matches!(err, Error::Serde(_)));
            assert!(auth.account().imap.is_none());
        }
    }

    mod logout_tests {
        use super::*;

        #[tokio::test]
        async fn removes_everything() {
            let storage = Arc::new(seeded_storage());
            let codec = Arc::new(FakeCodec::default());
            let mut auth = auth(&storage, &codec);
            auth.get_credentials().await.unwrap();

            auth.logout().await.unwrap();

            assert_eq!(auth.account(), &Account::default());
            for key in CredentialKey::ALL {
                assert!(storage.stored(key.as_str()).is_empty());
            }
        }
    }
}
