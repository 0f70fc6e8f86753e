use chrono::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Engine error taxonomy.
///
/// Credential and second-factor failures are deliberately coarse: an unknown
/// identifier and a wrong password are indistinguishable, and no variant
/// says which check inside a step failed. `SecondFactorRequired` is not an
/// error - it is a `LoginOutcome` variant.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked; try again in {}", humanize(*retry_after))]
    AccountLocked { retry_after: Duration },

    #[error("invalid second factor code")]
    InvalidSecondFactor,

    #[error("no enrollment in progress")]
    EnrollmentNotInProgress,

    #[error("enrollment window has expired")]
    EnrollmentExpired,

    #[error("second factor is already enabled")]
    AlreadyEnabled,

    #[error("second factor is not enabled")]
    NotEnabled,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token")]
    TokenInvalid,

    #[error("email address is not verified")]
    EmailNotVerified,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("email already registered")]
    EmailAlreadyRegistered,

    #[error("account not found")]
    AccountNotFound,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable category for callers.
    pub fn category(&self) -> &'static str {
        match self {
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::AccountLocked { .. } => "account_locked",
            ServiceError::InvalidSecondFactor => "invalid_second_factor",
            ServiceError::EnrollmentNotInProgress => "enrollment_not_in_progress",
            ServiceError::EnrollmentExpired => "enrollment_expired",
            ServiceError::AlreadyEnabled => "already_enabled",
            ServiceError::NotEnabled => "not_enabled",
            ServiceError::TokenExpired => "token_expired",
            ServiceError::TokenInvalid => "token_invalid",
            ServiceError::EmailNotVerified => "email_not_verified",
            ServiceError::AccountDisabled => "account_disabled",
            ServiceError::EmailAlreadyRegistered => "email_already_registered",
            ServiceError::AccountNotFound => "account_not_found",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::Configuration(_) => "configuration_error",
            ServiceError::Storage(_) => "storage_error",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Human-readable remaining-time estimate for lockout messages.
fn humanize(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs >= 120 {
        format!("about {} minutes", (secs + 59) / 60)
    } else if secs >= 60 {
        "about a minute".to_string()
    } else {
        format!("{} seconds", secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_message_includes_remaining_minutes() {
        let err = ServiceError::AccountLocked {
            retry_after: Duration::minutes(29) + Duration::seconds(30),
        };
        assert_eq!(err.to_string(), "account is locked; try again in about 30 minutes");
        assert_eq!(err.category(), "account_locked");
    }

    #[test]
    fn short_locks_render_in_seconds() {
        let err = ServiceError::AccountLocked {
            retry_after: Duration::seconds(45),
        };
        assert_eq!(err.to_string(), "account is locked; try again in 45 seconds");
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(ServiceError::InvalidCredentials.category(), "invalid_credentials");
        assert_eq!(ServiceError::TokenExpired.category(), "token_expired");
        assert_eq!(ServiceError::EnrollmentExpired.category(), "enrollment_expired");
    }

    #[test]
    fn credential_failures_do_not_leak_detail() {
        // Unknown identifier and wrong password share one message.
        assert_eq!(ServiceError::InvalidCredentials.to_string(), "invalid credentials");
    }
}
