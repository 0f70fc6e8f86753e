use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive-failure counter with an optional timed lock.
///
/// Two independent instances live on an account: one gating the password
/// step, one gating the second-factor step. Transitions are applied by
/// `services::lockout::LockoutPolicy`; this type is pure state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    /// True when no failures have been recorded and no lock is pending.
    pub fn is_clear(&self) -> bool {
        self.failed_attempts == 0 && self.locked_until.is_none()
    }
}
