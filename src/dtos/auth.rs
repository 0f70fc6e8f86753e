use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{AccountSummary, ClientMetadata};
use crate::services::TokenPair;

/// A login attempt. TOTP code and recovery code are mutually exclusive per
/// attempt; the orchestrator rejects requests carrying both.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub totp_code: Option<String>,
    pub recovery_code: Option<String>,
    #[serde(default)]
    pub trust_device: bool,
    pub client: ClientMetadata,
}

impl LoginRequest {
    /// Password-only attempt.
    pub fn password_only(email: &str, password: &str, client: ClientMetadata) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            totp_code: None,
            recovery_code: None,
            trust_device: false,
            client,
        }
    }
}

/// Registration request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// What registration hands back. The account stays pending until the
/// emailed code is confirmed.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterReceipt {
    pub account_id: Uuid,
    pub email: String,
}

/// How a login attempt resolved, short of a typed failure.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(AuthenticatedSession),
    SecondFactorRequired(SecondFactorChallenge),
}

/// A completed login: tokens plus a sanitized account view.
#[derive(Debug, Serialize)]
pub struct AuthenticatedSession {
    pub account: AccountSummary,
    pub tokens: TokenPair,
}

/// Password accepted, second factor still owed. No tokens are issued; the
/// caller retries `login` with a code. The account reference is opaque to
/// clients.
#[derive(Debug, Clone, Serialize)]
pub struct SecondFactorChallenge {
    pub account_ref: Uuid,
    pub email_hint: String,
}

/// What starting an enrollment hands back. The recovery codes and manual
/// key appear here exactly once; only hashes and ciphertext are persisted.
#[derive(Debug, Serialize)]
pub struct EnrollmentStart {
    pub provisioning_uri: String,
    pub manual_key: String,
    pub recovery_codes: Vec<String>,
}

/// Mask an email for the second-factor challenge hint:
/// `jane@example.com` -> `j***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn client() -> ClientMetadata {
        ClientMetadata {
            ip_address: "198.51.100.4".to_string(),
            user_agent: "test-agent".to_string(),
        }
    }

    #[test]
    fn mask_email_keeps_first_character_and_domain() {
        assert_eq!(mask_email("jane@example.com"), "j***@example.com");
        assert_eq!(mask_email("a@b.io"), "a***@b.io");
        assert_eq!(mask_email("not-an-email"), "***");
    }

    #[test]
    fn register_request_rejects_short_password() {
        let req = RegisterRequest {
            email: "a@example.com".to_string(),
            password: "short".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn register_request_rejects_malformed_email() {
        let req = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "long-enough-password".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn login_request_validates() {
        let req = LoginRequest::password_only("a@example.com", "p@ss1234", client());
        assert!(req.validate().is_ok());

        let empty_password = LoginRequest::password_only("a@example.com", "", client());
        assert!(empty_password.validate().is_err());
    }
}
