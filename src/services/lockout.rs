//! Consecutive-failure lockout policy.
//!
//! Two policies exist with deliberately different lock durations: password
//! failures lock for 30 minutes, second-factor failures for 15 (codes
//! rotate every 30 seconds, which caps what a brute-force attempt is
//! worth). Locks are purely time-based and auto-expire.

use chrono::{DateTime, Duration, Utc};

use crate::models::LockoutState;

/// Threshold + duration pair applied to a `LockoutState`.
///
/// All transitions are value-to-value: callers load state, compute the next
/// state, and persist it as one write.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    max_attempts: u32,
    lock_minutes: i64,
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lock_minutes: i64) -> Self {
        Self {
            max_attempts,
            lock_minutes,
        }
    }

    /// Spec defaults for the password step.
    pub fn password_default() -> Self {
        Self::new(5, 30)
    }

    /// Spec defaults for the second-factor step.
    pub fn second_factor_default() -> Self {
        Self::new(5, 15)
    }

    /// Count one more failure. A lock that has already expired clears the
    /// counter first; crossing the threshold sets the lock.
    pub fn record_failure(&self, state: &LockoutState, now: DateTime<Utc>) -> LockoutState {
        let stale = matches!(state.locked_until, Some(until) if until <= now);
        let failed_attempts = if stale { 1 } else { state.failed_attempts + 1 };

        let locked_until = if failed_attempts >= self.max_attempts {
            Some(now + Duration::minutes(self.lock_minutes))
        } else {
            None
        };

        LockoutState {
            failed_attempts,
            locked_until,
        }
    }

    pub fn is_locked(&self, state: &LockoutState, now: DateTime<Utc>) -> bool {
        matches!(state.locked_until, Some(until) if until > now)
    }

    /// Time left on an active lock.
    pub fn remaining(&self, state: &LockoutState, now: DateTime<Utc>) -> Option<Duration> {
        state
            .locked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Successful verification clears both counter and lock.
    pub fn reset(&self) -> LockoutState {
        LockoutState::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_engages_at_threshold() {
        let policy = LockoutPolicy::password_default();
        let now = Utc::now();
        let mut state = LockoutState::default();
        for _ in 0..4 {
            state = policy.record_failure(&state, now);
            assert!(!policy.is_locked(&state, now));
        }
        state = policy.record_failure(&state, now);
        assert_eq!(state.failed_attempts, 5);
        assert!(policy.is_locked(&state, now));
    }

    #[test]
    fn password_lock_lasts_at_least_thirty_minutes() {
        let policy = LockoutPolicy::password_default();
        let now = Utc::now();
        let mut state = LockoutState::default();
        for _ in 0..5 {
            state = policy.record_failure(&state, now);
        }
        let remaining = policy.remaining(&state, now).unwrap();
        assert!(remaining >= Duration::minutes(30) - Duration::seconds(1));
        assert!(policy.is_locked(&state, now + Duration::minutes(29)));
        assert!(!policy.is_locked(&state, now + Duration::minutes(31)));
    }

    #[test]
    fn second_factor_lock_is_shorter() {
        let policy = LockoutPolicy::second_factor_default();
        let now = Utc::now();
        let mut state = LockoutState::default();
        for _ in 0..5 {
            state = policy.record_failure(&state, now);
        }
        assert!(policy.is_locked(&state, now + Duration::minutes(14)));
        assert!(!policy.is_locked(&state, now + Duration::minutes(16)));
    }

    #[test]
    fn failure_after_expired_lock_restarts_the_count() {
        let policy = LockoutPolicy::new(5, 30);
        let now = Utc::now();
        let mut state = LockoutState::default();
        for _ in 0..5 {
            state = policy.record_failure(&state, now);
        }
        let later = now + Duration::minutes(31);
        state = policy.record_failure(&state, later);
        assert_eq!(state.failed_attempts, 1);
        assert!(!policy.is_locked(&state, later));
    }

    #[test]
    fn reset_clears_counter_and_lock() {
        let policy = LockoutPolicy::password_default();
        let now = Utc::now();
        let mut state = LockoutState::default();
        for _ in 0..5 {
            state = policy.record_failure(&state, now);
        }
        state = policy.reset();
        assert!(state.is_clear());
        assert!(!policy.is_locked(&state, now));
    }

    #[test]
    fn no_remaining_time_when_unlocked() {
        let policy = LockoutPolicy::password_default();
        assert!(policy
            .remaining(&LockoutState::default(), Utc::now())
            .is_none());
    }
}
