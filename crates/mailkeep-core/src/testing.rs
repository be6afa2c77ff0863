//! In-memory collaborators and fixtures for unit tests.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use mailkeep_oauth::Provider;
use serde_json::{Value, json};

use crate::account::ConnectionConfig;
use crate::crypto::{CryptoError, CryptoResult, SecretCodec};
use crate::oauth::OAuthService;
use crate::storage::{DeviceStorage, StorageError, StorageResult};

pub const EMAIL_ADDRESS: &str = "bla@blubb.com";
pub const USERNAME: &str = "bla";
pub const REALNAME: &str = "Bla Blubb";
pub const PROVIDER: &str = "gmail";
pub const PASSWORD: &str = "passwordpasswordpassword";
pub const ENCRYPTED_PASSWORD: &str = "pgppasswordpgppassword";
pub const OAUTH_TOKEN: &str = "tokentokentokentoken";
pub const CERTIFICATE: &str =
    "-----BEGIN CERTIFICATE-----\nPEMPEMPEMPEMPEMPEM\n-----END CERTIFICATE-----";

pub fn imap_config() -> ConnectionConfig {
    ConnectionConfig::new("mail.blablubb.com", 123, true).with_ca(CERTIFICATE)
}

pub fn smtp_config() -> ConnectionConfig {
    ConnectionConfig::new("mail.blablubb.com", 456, true).with_ca(CERTIFICATE)
}

/// Storage holding a complete, previously stored account.
pub fn seeded_storage() -> FakeStorage {
    let storage = FakeStorage::default();
    storage.seed("emailaddress", vec![json!(EMAIL_ADDRESS)]);
    storage.seed("username", vec![json!(USERNAME)]);
    storage.seed("realname", vec![json!(REALNAME)]);
    storage.seed("password", vec![json!(ENCRYPTED_PASSWORD)]);
    storage.seed("provider", vec![json!(PROVIDER)]);
    storage.seed("imap", vec![serde_json::to_value(imap_config()).unwrap()]);
    storage.seed("smtp", vec![serde_json::to_value(smtp_config()).unwrap()]);
    storage
}

/// Device storage backed by a map, counting calls and failing on demand.
#[derive(Default)]
pub struct FakeStorage {
    items: Mutex<HashMap<String, Vec<Value>>>,
    reads: Mutex<Vec<String>>,
    writes: Mutex<Vec<String>>,
    failing_write: Mutex<Option<String>>,
    pub fail_reads: AtomicBool,
}

impl FakeStorage {
    /// Puts values in place without counting a write.
    pub fn seed(&self, key: &str, values: Vec<Value>) {
        self.items.lock().unwrap().insert(key.to_string(), values);
    }

    /// Makes every write to `key` fail from now on.
    pub fn fail_writes_on(&self, key: &str) {
        *self.failing_write.lock().unwrap() = Some(key.to_string());
    }

    pub fn stored(&self, key: &str) -> Vec<Value> {
        self.items
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Everything held, serialized, for substring checks.
    pub fn dump(&self) -> String {
        let items = self.items.lock().unwrap();
        serde_json::to_string(&*items).unwrap()
    }

    pub fn list_calls(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    pub fn store_calls(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn store_calls_for(&self, key: &str) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }
}

#[async_trait]
impl DeviceStorage for FakeStorage {
    async fn list_items(
        &self,
        key: &str,
        offset: usize,
        count: Option<usize>,
    ) -> StorageResult<Vec<Value>> {
        self.reads.lock().unwrap().push(key.to_string());
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("read of {key} failed")));
        }
        let values = self.stored(key).into_iter().skip(offset);
        Ok(match count {
            Some(count) => values.take(count).collect(),
            None => values.collect(),
        })
    }

    async fn store_list(&self, values: Vec<Value>, key: &str) -> StorageResult<()> {
        if self.failing_write.lock().unwrap().as_deref() == Some(key) {
            return Err(StorageError::Backend(format!("write of {key} failed")));
        }
        self.writes.lock().unwrap().push(key.to_string());
        self.seed(key, values);
        Ok(())
    }

    async fn remove_list(&self, key: &str) -> StorageResult<()> {
        self.items.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Reversible codec mapping the fixture password to its fixture ciphertext.
#[derive(Default)]
pub struct FakeCodec {
    pub encrypt_calls: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl SecretCodec for FakeCodec {
    async fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CryptoError::Encrypt);
        }
        Ok(if plaintext == PASSWORD {
            ENCRYPTED_PASSWORD.to_string()
        } else {
            format!("pgp:{plaintext}")
        })
    }

    async fn decrypt(&self, ciphertext: &str, _key_hint: Option<&str>) -> CryptoResult<String> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CryptoError::Decrypt);
        }
        if ciphertext == ENCRYPTED_PASSWORD {
            return Ok(PASSWORD.to_string());
        }
        ciphertext
            .strip_prefix("pgp:")
            .map(str::to_string)
            .ok_or(CryptoError::Decrypt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthCall {
    Token(Option<String>),
    Email(String),
}

/// `OAuth2` service answering with fixed values; `None` makes the call fail.
pub struct FakeOAuth {
    token: Option<String>,
    email: Option<String>,
    provider: Provider,
    calls: Mutex<Vec<OAuthCall>>,
}

impl FakeOAuth {
    /// A Google service.
    pub fn new(token: Option<&str>, email: Option<&str>) -> Self {
        Self {
            token: token.map(str::to_string),
            email: email.map(str::to_string),
            provider: Provider::google().unwrap(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn calls(&self) -> Vec<OAuthCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OAuthService for FakeOAuth {
    async fn get_oauth_token(&self, email_address: Option<&str>) -> mailkeep_oauth::Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(OAuthCall::Token(email_address.map(str::to_string)));
        self.token
            .clone()
            .ok_or_else(|| mailkeep_oauth::Error::oauth_error("invalid_grant", "revoked"))
    }

    async fn query_email_address(&self, token: &str) -> mailkeep_oauth::Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(OAuthCall::Email(token.to_string()));
        self.email.clone().ok_or(mailkeep_oauth::Error::MissingEmail)
    }

    fn serves(&self, host: &str) -> bool {
        self.provider.serves(host)
    }
}
