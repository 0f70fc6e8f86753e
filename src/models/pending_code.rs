//! Emailed one-time codes for email verification and password reset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime of an emailed code.
pub const EMAIL_CODE_TTL_MINUTES: i64 = 15;

/// What an emailed code is allowed to prove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    EmailVerification,
    PasswordReset,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::EmailVerification => "email_verification",
            CodePurpose::PasswordReset => "password_reset",
        }
    }
}

/// A pending emailed code. Only the hash is persisted; the plaintext goes
/// out through the email collaborator and is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCode {
    pub purpose: CodePurpose,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PendingCode {
    pub fn new(purpose: CodePurpose, code_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            purpose,
            code_hash,
            expires_at: now + Duration::minutes(EMAIL_CODE_TTL_MINUTES),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
