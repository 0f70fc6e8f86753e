use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Active refresh tokens kept per account; issuing past the cap evicts the
/// oldest entry.
pub const REFRESH_TOKEN_LIMIT: usize = 5;

/// A member of an account's active refresh-token set.
///
/// The raw token never touches storage; only its SHA-256 digest does. A
/// presented token is honored when its `jti` claim matches `id` and its
/// digest matches `token_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(id: Uuid, raw_token: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            token_hash: Self::hash_token(raw_token),
            issued_at: now,
        }
    }

    /// SHA-256 digest of a raw token, hex-encoded.
    pub fn hash_token(raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Constant-time comparison of a presented raw token against the stored
    /// digest.
    pub fn matches(&self, raw: &str) -> bool {
        let presented = Self::hash_token(raw);
        presented
            .as_bytes()
            .ct_eq(self.token_hash.as_bytes())
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_digest_not_raw_token() {
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "raw-token-value", Utc::now());
        assert_ne!(record.token_hash, "raw-token-value");
        assert_eq!(record.token_hash.len(), 64);
    }

    #[test]
    fn matches_only_the_original_token() {
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "raw-token-value", Utc::now());
        assert!(record.matches("raw-token-value"));
        assert!(!record.matches("raw-token-valuE"));
    }

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(
            RefreshTokenRecord::hash_token("abc"),
            RefreshTokenRecord::hash_token("abc")
        );
        assert_ne!(
            RefreshTokenRecord::hash_token("abc"),
            RefreshTokenRecord::hash_token("abd")
        );
    }
}
