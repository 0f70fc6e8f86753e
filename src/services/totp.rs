//! Time-based one-time codes (RFC 6238).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::services::error::ServiceError;
use crate::services::secret::SecretCodec;

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;
/// Accepted drift: current step plus/minus one. Widening this trades
/// security for convenience; keep it at one.
const SKEW_STEPS: u8 = 1;

/// A freshly generated per-account secret plus its provisioning rendering.
#[derive(Debug, Clone)]
pub struct GeneratedSecret {
    pub secret: Vec<u8>,
    /// Base32 form, shown once for manual authenticator entry.
    pub base32: String,
    /// otpauth:// URI, rendered into a QR code by the caller.
    pub provisioning_uri: String,
}

/// Code generation and verification against encrypted-at-rest secrets.
#[derive(Clone)]
pub struct TotpEngine {
    issuer: String,
    codec: Arc<SecretCodec>,
}

impl TotpEngine {
    pub fn new(issuer: impl Into<String>, codec: Arc<SecretCodec>) -> Self {
        Self {
            issuer: issuer.into(),
            codec,
        }
    }

    /// Generate a fresh secret labelled for one account.
    pub fn generate_secret(&self, account_email: &str) -> Result<GeneratedSecret, ServiceError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("secret generation: {e:?}")))?;

        let totp = self.build(secret_bytes.clone(), account_email)?;

        Ok(GeneratedSecret {
            secret: secret_bytes,
            base32: secret.to_encoded().to_string(),
            provisioning_uri: totp.get_url(),
        })
    }

    /// Verify a submitted code against an encrypted secret at the current
    /// time. Malformed input fails fast, before any cryptographic work.
    pub fn verify(
        &self,
        code: &str,
        secret_enc: &str,
        account_id: Uuid,
    ) -> Result<bool, ServiceError> {
        self.verify_at(code, secret_enc, account_id, Utc::now())
    }

    /// Verification pinned to an explicit instant.
    pub fn verify_at(
        &self,
        code: &str,
        secret_enc: &str,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let Some(code) = normalize_code(code) else {
            return Ok(false);
        };
        let secret = self.codec.decrypt(secret_enc, account_id)?;
        let totp = self.build(secret, "account")?;
        Ok(totp.check(&code, at.timestamp() as u64))
    }

    fn build(&self, secret: Vec<u8>, label: &str) -> Result<TOTP, ServiceError> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW_STEPS,
            STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            label.to_string(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("totp init: {e}")))
    }
}

/// Strip whitespace and require exactly six ASCII digits.
pub fn normalize_code(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.len() == DIGITS && stripped.chars().all(|c| c.is_ascii_digit()) {
        Some(stripped)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    fn engine() -> TotpEngine {
        let security = SecurityConfig {
            encryption_key: "0123456789abcdef0123456789abcdef".to_string(),
            fingerprint_key: "fingerprint-key-0123456789abcdef".to_string(),
            totp_issuer: "trustgate-test".to_string(),
        };
        let codec = Arc::new(SecretCodec::new(&security).unwrap());
        TotpEngine::new("trustgate-test", codec)
    }

    fn code_for(secret: &[u8], at: DateTime<Utc>) -> String {
        let totp = TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW_STEPS,
            STEP_SECONDS,
            secret.to_vec(),
            Some("trustgate-test".to_string()),
            "account".to_string(),
        )
        .unwrap();
        totp.generate(at.timestamp() as u64)
    }

    #[test]
    fn provisioning_uri_carries_issuer_and_account() {
        let generated = engine().generate_secret("alice@example.com").unwrap();
        assert!(generated.provisioning_uri.starts_with("otpauth://totp/"));
        assert!(generated.provisioning_uri.contains("trustgate-test"));
        assert!(!generated.base32.is_empty());
        assert!(generated.secret.len() >= 16);
    }

    #[test]
    fn current_code_verifies() {
        let engine = engine();
        let account_id = Uuid::new_v4();
        let generated = engine.generate_secret("alice@example.com").unwrap();
        let secret_enc = engine.codec.encrypt(&generated.secret, account_id).unwrap();

        let now = Utc::now();
        let code = code_for(&generated.secret, now);
        assert!(engine.verify_at(&code, &secret_enc, account_id, now).unwrap());
    }

    #[test]
    fn adjacent_step_is_tolerated_but_not_two() {
        let engine = engine();
        let account_id = Uuid::new_v4();
        let generated = engine.generate_secret("alice@example.com").unwrap();
        let secret_enc = engine.codec.encrypt(&generated.secret, account_id).unwrap();

        let now = Utc::now();
        let previous = code_for(&generated.secret, now - chrono::Duration::seconds(30));
        assert!(engine
            .verify_at(&previous, &secret_enc, account_id, now)
            .unwrap());

        let stale = code_for(&generated.secret, now - chrono::Duration::seconds(120));
        assert!(!engine
            .verify_at(&stale, &secret_enc, account_id, now)
            .unwrap());
    }

    #[test]
    fn wrong_code_fails() {
        let engine = engine();
        let account_id = Uuid::new_v4();
        let generated = engine.generate_secret("alice@example.com").unwrap();
        let secret_enc = engine.codec.encrypt(&generated.secret, account_id).unwrap();

        let now = Utc::now();
        let code = code_for(&generated.secret, now);
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(!engine.verify_at(wrong, &secret_enc, account_id, now).unwrap());
    }

    #[test]
    fn malformed_input_fails_fast() {
        assert_eq!(normalize_code(" 123 456 "), Some("123456".to_string()));
        assert_eq!(normalize_code("12345"), None);
        assert_eq!(normalize_code("1234567"), None);
        assert_eq!(normalize_code("12345a"), None);
        assert_eq!(normalize_code(""), None);
    }
}
