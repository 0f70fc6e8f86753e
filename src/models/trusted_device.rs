use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::login_event::ClientMetadata;

/// A client fingerprint allowed to skip the second-factor check.
///
/// Created only after a successful second-factor verification, never as a
/// side effect of a password-only login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedDevice {
    pub fingerprint: String,
    pub display_name: String,
    pub user_agent: String,
    pub ip_address: String,
    pub trusted_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub active: bool,
}

impl TrustedDevice {
    pub fn new(fingerprint: String, client: &ClientMetadata, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            display_name: client.device_summary(),
            user_agent: client.user_agent.clone(),
            ip_address: client.ip_address.clone(),
            trusted_at: now,
            last_used_at: now,
            active: true,
        }
    }
}
