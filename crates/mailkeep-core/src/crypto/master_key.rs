//! Master key kept in the system keyring.
//!
//! The platform's native credential storage holds the key:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use keyring::Entry;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{CryptoError, CryptoResult};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Keyring user name the master key is filed under.
const MASTER_KEY_ENTRY: &str = "master_key";

/// 256-bit key sealing account secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&Aes256Gcm::generate_key(&mut OsRng));
        Self(bytes)
    }

    /// Wraps existing key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decodes a base64 key.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not base64 or not 32 bytes long.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64.decode(encoded.trim())?;
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|raw: Vec<u8>| {
            CryptoError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes (256 bits), got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short public identifier: hex of the first 8 bytes of the key's SHA-256.
    #[must_use]
    pub fn id(&self) -> String {
        let digest = Sha256::digest(self.0);
        digest[..8].iter().map(|byte| format!("{byte:02x}")).collect()
    }

    /// Loads the key from the keyring, generating and storing one on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring is unavailable or holds a malformed key.
    pub fn load_or_create(service: &str) -> CryptoResult<Self> {
        let entry = Entry::new(service, MASTER_KEY_ENTRY)?;
        match entry.get_password() {
            Ok(encoded) => {
                let key = Self::from_base64(&encoded)?;
                debug!("Loaded master key {} from keyring", key.id());
                Ok(key)
            }
            Err(keyring::Error::NoEntry) => {
                let key = Self::generate();
                entry.set_password(&key.to_base64())?;
                info!("Generated master key {} and stored it in the keyring", key.id());
                Ok(key)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the key from the keyring. Secrets sealed with it become
    /// unreadable.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails (except for a missing entry).
    pub fn delete(service: &str) -> CryptoResult<()> {
        let entry = Entry::new(service, MASTER_KEY_ENTRY)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MasterKey").field(&self.id()).finish()
    }
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
    fn test_base64_round_trip() {
        let key = MasterKey::generate();
        let decoded = MasterKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let short = BASE64.encode([7u8; 16]);
        assert!(matches!(
            MasterKey::from_base64(&short),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_id_is_stable_and_short() {
        let key = MasterKey::from_bytes([1u8; KEY_SIZE]);
        assert_eq!(key.id().len(), 16);
        assert_eq!(key.id(), MasterKey::from_bytes([1u8; KEY_SIZE]).id());
        assert_ne!(key.id(), MasterKey::from_bytes([2u8; KEY_SIZE]).id());
    }

    #[test]
    fn test_id_is_sha256_prefix_in_hex() {
        assert_eq!(MasterKey::from_bytes([0u8; KEY_SIZE]).id(), "66687aadf862bd77");
        assert_eq!(MasterKey::from_bytes([1u8; KEY_SIZE]).id(), "72cd6e8422c407fb");
    }

    #[test]
    fn test_debug_hides_key_bytes() {
        let key = MasterKey::from_bytes([0xab; KEY_SIZE]);
        assert!(!format!("{key:?}").contains(&key.to_base64()));
    }

    // These tests interact with the actual system keyring.
    // Run manually with `cargo test -- --ignored`
    #[test]
    #[ignore = "Interacts with system keyring"]
    fn test_load_or_create_is_stable() {
        let service = "mailkeep-test";
        let first = MasterKey::load_or_create(service).unwrap();
        let second = MasterKey::load_or_create(service).unwrap();
        assert_eq!(first, second);
        MasterKey::delete(service).unwrap();
    }
}
