//! Shared harness for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use trustgate::config::{
    AuthConfig, Environment, JwtConfig, LockoutConfig, SecurityConfig, SmtpConfig,
};
use trustgate::dtos::RegisterRequest;
use trustgate::models::{Account, ClientMetadata};
use trustgate::services::{EmailKind, MockEmailService};
use trustgate::store::{AccountStore, InMemoryAccountStore};
use trustgate::AuthEngine;

pub const TEST_PASSWORD: &str = "p@ss1234";

/// Engine wired to an in-memory store and a recording email provider.
pub struct TestEngine {
    pub engine: AuthEngine,
    pub store: Arc<InMemoryAccountStore>,
    pub email: MockEmailService,
}

impl TestEngine {
    pub fn spawn() -> Self {
        let config = test_config();
        let store = Arc::new(InMemoryAccountStore::new());
        let email = MockEmailService::new();
        let engine = AuthEngine::new(
            &config,
            store.clone() as Arc<dyn AccountStore>,
            Arc::new(email.clone()),
        )
        .expect("engine construction");
        Self {
            engine,
            store,
            email,
        }
    }

    /// Register an account and complete email verification.
    pub async fn register_verified(&self, email: &str, password: &str) -> Uuid {
        let receipt = self
            .engine
            .auth
            .register(RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .expect("register");
        let code = self.wait_for_code(email, EmailKind::VerificationCode).await;
        self.engine
            .auth
            .verify_email(email, &code)
            .await
            .expect("verify email");
        receipt.account_id
    }

    /// Enable the second factor end to end. Returns the recovery codes and
    /// the manual key for generating authenticator codes.
    pub async fn enroll_second_factor(&self, account_id: Uuid) -> (Vec<String>, String) {
        let start = self
            .engine
            .enrollment
            .start_enrollment(account_id)
            .await
            .expect("start enrollment");
        let code = totp_now(&start.manual_key);
        self.engine
            .enrollment
            .confirm_enrollment(account_id, &code)
            .await
            .expect("confirm enrollment");
        (start.recovery_codes, start.manual_key)
    }

    /// Emailed sends are dispatched fire-and-forget; poll the recorder.
    pub async fn wait_for_code(&self, to: &str, kind: EmailKind) -> String {
        for _ in 0..200 {
            if let Some(code) = self.email.last_code(to, kind) {
                return code;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no {:?} email recorded for {}", kind, to);
    }

    pub async fn account(&self, id: Uuid) -> Account {
        self.store
            .find_by_id(id)
            .await
            .expect("store read")
            .expect("account exists")
    }

    /// Edit persisted account state directly (clock manipulation etc.).
    pub async fn mutate_account<F: FnOnce(&mut Account)>(&self, id: Uuid, f: F) {
        let mut account = self.account(id).await;
        f(&mut account);
        self.store.save(account).await.expect("store write");
    }
}

pub fn client() -> ClientMetadata {
    client_with(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        "198.51.100.4",
    )
}

pub fn other_client() -> ClientMetadata {
    client_with(
        "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
        "203.0.113.9",
    )
}

pub fn client_with(user_agent: &str, ip_address: &str) -> ClientMetadata {
    ClientMetadata {
        ip_address: ip_address.to_string(),
        user_agent: user_agent.to_string(),
    }
}

/// Act as the authenticator app: current code for a base32 manual key.
pub fn totp_now(manual_key: &str) -> String {
    totp_at_offset(manual_key, 0)
}

/// Code for a time step in the past or future (seconds relative to now).
pub fn totp_at_offset(manual_key: &str, offset_secs: i64) -> String {
    let secret = Secret::Encoded(manual_key.to_string())
        .to_bytes()
        .expect("manual key decodes");
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret,
        Some("trustgate-test".to_string()),
        "account".to_string(),
    )
    .expect("totp init");
    let now = chrono::Utc::now().timestamp() + offset_secs;
    totp.generate(now as u64)
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        environment: Environment::Dev,
        service_name: "trustgate-test".to_string(),
        log_level: "error".to_string(),
        jwt: JwtConfig {
            secret: "test-signing-secret-0123456789abcdef".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        security: SecurityConfig {
            encryption_key: "test-encryption-key-0123456789abcdef".to_string(),
            fingerprint_key: "test-fingerprint-key-0123456789".to_string(),
            totp_issuer: "trustgate-test".to_string(),
        },
        smtp: SmtpConfig {
            host: "smtp.example.com".to_string(),
            user: "noreply@example.com".to_string(),
            app_password: "unused".to_string(),
        },
        lockout: LockoutConfig {
            password_max_attempts: 5,
            password_lock_minutes: 30,
            second_factor_max_attempts: 5,
            second_factor_lock_minutes: 15,
        },
    }
}
