//! Stable device fingerprints for trust-bypass matching.
//!
//! The fingerprint is a keyed HMAC over the client's user agent and network
//! address and contains no time component, so a stored trusted device keeps
//! matching future logins from the same client until it is removed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::SecurityConfig;
use crate::models::ClientMetadata;
use crate::services::error::ServiceError;

/// Minimum accepted fingerprint key, enforced at startup.
pub const MIN_FINGERPRINT_KEY_BYTES: usize = 16;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct DeviceFingerprint {
    key: Vec<u8>,
}

impl std::fmt::Debug for DeviceFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFingerprint")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl DeviceFingerprint {
    pub fn new(security: &SecurityConfig) -> Result<Self, ServiceError> {
        if security.fingerprint_key.len() < MIN_FINGERPRINT_KEY_BYTES {
            return Err(ServiceError::Configuration(format!(
                "fingerprint key must be at least {} bytes",
                MIN_FINGERPRINT_KEY_BYTES
            )));
        }
        Ok(Self {
            key: security.fingerprint_key.as_bytes().to_vec(),
        })
    }

    /// Deterministic fingerprint for stable client metadata.
    pub fn compute(&self, client: &ClientMetadata) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(client.user_agent.as_bytes());
        mac.update(b"\n");
        mac.update(client.ip_address.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}
