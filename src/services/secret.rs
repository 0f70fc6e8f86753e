//! Secret codec: reversible encryption for the TOTP secret, one-way
//! hashing for everything else.
//!
//! Only the TOTP secret is ever decrypted - the algorithm needs the raw
//! bytes to compute codes. Recovery codes and emailed codes are hashed and
//! compared content-addressed: hash the input, compare digests.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::services::error::ServiceError;

/// Minimum accepted key material, enforced at startup.
pub const MIN_KEY_BYTES: usize = 32;

const NONCE_BYTES: usize = 12;

/// Process-wide symmetric codec, constructed once from the startup
/// configuration and passed by reference to the components that need it.
#[derive(Clone)]
pub struct SecretCodec {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}

impl SecretCodec {
    /// Build the codec. A missing or short key is a fatal configuration
    /// error, not a runtime one.
    pub fn new(security: &SecurityConfig) -> Result<Self, ServiceError> {
        if security.encryption_key.len() < MIN_KEY_BYTES {
            return Err(ServiceError::Configuration(format!(
                "encryption key must be at least {} bytes",
                MIN_KEY_BYTES
            )));
        }
        // Normalize arbitrary-length key material to the cipher's key size.
        let digest: [u8; 32] = Sha256::digest(security.encryption_key.as_bytes()).into();
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&digest));
        Ok(Self { cipher })
    }

    /// Encrypt a secret for one account. Returns `base64(nonce || ct)`;
    /// the ciphertext is bound to the owning account via AAD.
    pub fn encrypt(&self, plaintext: &[u8], account_id: Uuid) -> Result<String, ServiceError> {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = aad_for(account_id);
        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("encrypt failure: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a secret previously produced by `encrypt` for the same
    /// account.
    pub fn decrypt(&self, encoded: &str, account_id: Uuid) -> Result<Vec<u8>, ServiceError> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("ciphertext decode: {e}")))?;
        if combined.len() <= NONCE_BYTES {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "ciphertext too short"
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_BYTES);
        let nonce = Nonce::from_slice(nonce_bytes);
        let aad = aad_for(account_id);

        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("decrypt failure: {e}")))
    }

    /// One-way hash for recovery codes and emailed codes (SHA-256, hex).
    pub fn hash_code(code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Content-addressed comparison: hash the presented code, compare the
    /// digests in constant time. Stored hashes are never decrypted.
    pub fn verify_code(code: &str, stored_hash: &str) -> bool {
        let presented = Self::hash_code(code);
        presented.as_bytes().ct_eq(stored_hash.as_bytes()).into()
    }
}

fn aad_for(account_id: Uuid) -> Vec<u8> {
    format!("totp-secret:v1|{account_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SecretCodec {
        let security = SecurityConfig {
            encryption_key: "0123456789abcdef0123456789abcdef".to_string(),
            fingerprint_key: "fingerprint-key-0123456789abcdef".to_string(),
            totp_issuer: "trustgate-test".to_string(),
        };
        SecretCodec::new(&security).unwrap()
    }

    #[test]
    fn short_key_is_a_fatal_configuration_error() {
        let security = SecurityConfig {
            encryption_key: "too-short".to_string(),
            fingerprint_key: "fingerprint-key-0123456789abcdef".to_string(),
            totp_issuer: "trustgate-test".to_string(),
        };
        let err = SecretCodec::new(&security).unwrap_err();
        assert_eq!(err.category(), "configuration_error");
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let codec = codec();
        let account_id = Uuid::new_v4();
        let secret = b"totp-secret-bytes-exactly";

        let encrypted = codec.encrypt(secret, account_id).unwrap();
        assert_ne!(encrypted.as_bytes(), secret);

        let decrypted = codec.decrypt(&encrypted, account_id).unwrap();
        assert_eq!(decrypted, secret);
    }

    #[test]
    fn ciphertext_is_bound_to_the_account() {
        let codec = codec();
        let owner = Uuid::new_v4();
        let encrypted = codec.encrypt(b"secret", owner).unwrap();
        assert!(codec.decrypt(&encrypted, Uuid::new_v4()).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let codec = codec();
        let account_id = Uuid::new_v4();
        let encrypted = codec.encrypt(b"secret", account_id).unwrap();

        let mut raw = BASE64.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = BASE64.encode(raw);

        assert!(codec.decrypt(&tampered, account_id).is_err());
    }

    #[test]
    fn nonces_differ_per_encryption() {
        let codec = codec();
        let account_id = Uuid::new_v4();
        let a = codec.encrypt(b"secret", account_id).unwrap();
        let b = codec.encrypt(b"secret", account_id).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn code_hash_verifies_content_addressed() {
        let hash = SecretCodec::hash_code("123456");
        assert!(SecretCodec::verify_code("123456", &hash));
        assert!(!SecretCodec::verify_code("123457", &hash));
    }
}
