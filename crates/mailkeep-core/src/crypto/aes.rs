//! AES-256-GCM secret codec.
//!
//! Each secret is sealed with a fresh random 96-bit nonce; the stored form is
//! `base64(nonce || ciphertext || tag)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::{CryptoError, CryptoResult, MasterKey, SecretCodec};

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Secret codec sealing with AES-256-GCM.
pub struct AesGcmCodec {
    cipher: Aes256Gcm,
    key_id: String,
}

impl AesGcmCodec {
    /// Creates a codec from a master key.
    #[must_use]
    pub fn new(key: &MasterKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
            key_id: key.id(),
        }
    }

    /// Identifier of the key this codec seals with.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn seal(&self, plaintext: &str) -> CryptoResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(BASE64.encode(out))
    }

    fn open(&self, ciphertext: &str) -> CryptoResult<String> {
        let raw = BASE64.decode(ciphertext.trim())?;
        if raw.len() <= NONCE_SIZE {
            return Err(CryptoError::Truncated);
        }

        let (nonce, sealed) = raw.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Decrypt)?;

        Ok(String::from_utf8(plaintext)?)
    }
}

impl std::fmt::Debug for AesGcmCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCodec")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretCodec for AesGcmCodec {
    async fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        self.seal(plaintext)
    }

    async fn decrypt(&self, ciphertext: &str, key_hint: Option<&str>) -> CryptoResult<String> {
        if let Some(expected) = key_hint
            && expected != self.key_id
        {
            return Err(CryptoError::KeyMismatch {
                expected: expected.to_string(),
                actual: self.key_id.clone(),
            });
        }
        self.open(ciphertext)
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

    fn codec() -> AesGcmCodec {
        AesGcmCodec::new(&MasterKey::generate())
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        let codec = codec();
        let sealed = codec.encrypt("passwordpasswordpassword").await.unwrap();
        assert_ne!(sealed, "passwordpasswordpassword");
        assert_eq!(
            codec.decrypt(&sealed, None).await.unwrap(),
            "passwordpasswordpassword"
        );
    }

    #[tokio::test]
    async fn test_nonce_is_fresh_per_encryption() {
        let codec = codec();
        let a = codec.encrypt("same").await.unwrap();
        let b = codec.encrypt("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_other_key_cannot_decrypt() {
        let sealed = codec().encrypt("secret").await.unwrap();
        assert!(matches!(
            codec().decrypt(&sealed, None).await,
            Err(CryptoError::Decrypt)
        ));
    }

    #[tokio::test]
    async fn test_tampering_is_detected() {
        let codec = codec();
        let sealed = codec.encrypt("secret").await.unwrap();
        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);

        assert!(matches!(
            codec.decrypt(&tampered, None).await,
            Err(CryptoError::Decrypt)
        ));
    }

    #[tokio::test]
    async fn test_malformed_input() {
        let codec = codec();
        assert!(matches!(
            codec.decrypt("not base64!", None).await,
            Err(CryptoError::Encoding(_))
        ));
        assert!(matches!(
            codec.decrypt(&BASE64.encode([0u8; 4]), None).await,
            Err(CryptoError::Truncated)
        ));
    }

    #[tokio::test]
    async fn test_key_hint() {
        let codec = codec();
        let sealed = codec.encrypt("secret").await.unwrap();

        let id = codec.key_id().to_string();
        assert_eq!(codec.decrypt(&sealed, Some(&id)).await.unwrap(), "secret");
        assert!(matches!(
            codec.decrypt(&sealed, Some("0000000000000000")).await,
            Err(CryptoError::KeyMismatch { .. })
        ));
    }
}
