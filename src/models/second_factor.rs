//! Second-factor configuration embedded in the account record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::lockout::LockoutState;

/// How long a started enrollment stays confirmable.
pub const ENROLLMENT_WINDOW_MINUTES: i64 = 10;

/// A single-use backup credential. Only the hash is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryCode {
    pub code_hash: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl RecoveryCode {
    pub fn new(code_hash: String) -> Self {
        Self {
            code_hash,
            used: false,
            used_at: None,
        }
    }
}

/// Per-account second-factor state.
///
/// At most one of the permanent and pending secrets drives verification at a
/// time: the pending secret exists only between enrollment start and
/// confirmation, the permanent secret only while `enabled` is true.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecondFactorConfig {
    pub enabled: bool,
    /// Encrypted permanent TOTP secret (present only once enabled).
    pub secret_enc: Option<String>,
    /// Encrypted pending secret, set between enrollment start and confirm.
    pub pending_secret_enc: Option<String>,
    pub pending_started_at: Option<DateTime<Utc>>,
    pub enrolled_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
    pub lockout: LockoutState,
    pub recovery_codes: Vec<RecoveryCode>,
}

impl SecondFactorConfig {
    /// Start (or restart) an enrollment. A previously pending secret is
    /// discarded; the recovery-code set is replaced wholesale.
    pub fn begin_enrollment(
        &mut self,
        secret_enc: String,
        recovery_codes: Vec<RecoveryCode>,
        now: DateTime<Utc>,
    ) {
        self.pending_secret_enc = Some(secret_enc);
        self.pending_started_at = Some(now);
        self.recovery_codes = recovery_codes;
    }

    pub fn pending_expired(&self, now: DateTime<Utc>) -> bool {
        match self.pending_started_at {
            Some(started) => now > started + Duration::minutes(ENROLLMENT_WINDOW_MINUTES),
            None => false,
        }
    }

    /// Drop an expired or abandoned enrollment without touching anything
    /// else.
    pub fn abandon_pending(&mut self) {
        self.pending_secret_enc = None;
        self.pending_started_at = None;
    }

    /// Promote the pending secret to permanent and flip the factor on.
    /// Returns false when no enrollment is pending.
    pub fn activate_pending(&mut self, now: DateTime<Utc>) -> bool {
        let Some(pending) = self.pending_secret_enc.take() else {
            return false;
        };
        self.secret_enc = Some(pending);
        self.pending_started_at = None;
        self.enabled = true;
        self.enrolled_at = Some(now);
        self.usage_count = 0;
        self.last_used_at = None;
        self.lockout = LockoutState::default();
        true
    }

    /// Record a successful verification: reset the failure counter and
    /// update usage bookkeeping.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.lockout = LockoutState::default();
        self.last_used_at = Some(now);
        self.usage_count += 1;
    }

    /// Replace every recovery code in one step. Prior codes, used or not,
    /// stop being valid.
    pub fn replace_recovery_codes(&mut self, codes: Vec<RecoveryCode>) {
        self.recovery_codes = codes;
    }

    pub fn unused_recovery_codes(&self) -> usize {
        self.recovery_codes.iter().filter(|c| !c.used).count()
    }
}

/// Canonical form of a recovery code as entered by a user: separators and
/// whitespace stripped, uppercased.
pub fn normalize_recovery_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
