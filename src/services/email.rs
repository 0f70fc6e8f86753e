//! Outbound email collaborator.
//!
//! The engine never depends on delivery succeeding: orchestrators dispatch
//! sends fire-and-forget and log failures instead of propagating them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::SmtpConfig;
use crate::services::error::ServiceError;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), ServiceError>;

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), ServiceError>;

    async fn send_welcome(&self, to: &str) -> Result<(), ServiceError>;
}

/// SMTP-backed provider.
#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, ServiceError> {
        let creds = Credentials::new(config.user.clone(), config.app_password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| ServiceError::Configuration(format!("smtp relay: {e}")))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "email service initialized");

        Ok(Self {
            mailer,
            from_email: config.user.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), ServiceError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| {
                        ServiceError::Internal(anyhow::anyhow!("from address: {e}"))
                    })?,
            )
            .to(to.parse().map_err(|e: lettre::address::AddressError| {
                ServiceError::Internal(anyhow::anyhow!("to address: {e}"))
            })?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("message build: {e}")))?;

        // Blocking SMTP send off the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("send task: {e}")))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to, subject = %subject, "email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to, "failed to send email");
                Err(ServiceError::Internal(anyhow::anyhow!("smtp send: {e}")))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), ServiceError> {
        let body = format!(
            "Your verification code is {code}.\n\n\
             It expires in 15 minutes. If you didn't create an account, ignore this email.",
        );
        self.send(to, "Verify your email address", body).await
    }

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), ServiceError> {
        let body = format!(
            "Your password reset code is {code}.\n\n\
             It expires in 15 minutes. If you didn't request a reset, ignore this email.",
        );
        self.send(to, "Reset your password", body).await
    }

    async fn send_welcome(&self, to: &str) -> Result<(), ServiceError> {
        let body = "Your email address is verified and your account is ready.".to_string();
        self.send(to, "Welcome", body).await
    }
}

/// What kind of message a recorded send was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    VerificationCode,
    PasswordResetCode,
    Welcome,
}

/// A send captured by the mock provider.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub kind: EmailKind,
    pub code: Option<String>,
}

/// In-memory provider for tests: records instead of sending.
#[derive(Clone, Default)]
pub struct MockEmailService {
    sent: Arc<Mutex<Vec<SentEmail>>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("mock email lock poisoned").clone()
    }

    /// Most recent code of a given kind sent to an address.
    pub fn last_code(&self, to: &str, kind: EmailKind) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to && m.kind == kind)
            .and_then(|m| m.code)
    }

    fn record(&self, mail: SentEmail) {
        self.sent.lock().expect("mock email lock poisoned").push(mail);
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), ServiceError> {
        self.record(SentEmail {
            to: to.to_string(),
            kind: EmailKind::VerificationCode,
            code: Some(code.to_string()),
        });
        Ok(())
    }

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), ServiceError> {
        self.record(SentEmail {
            to: to.to_string(),
            kind: EmailKind::PasswordResetCode,
            code: Some(code.to_string()),
        });
        Ok(())
    }

    async fn send_welcome(&self, to: &str) -> Result<(), ServiceError> {
        self.record(SentEmail {
            to: to.to_string(),
            kind: EmailKind::Welcome,
            code: None,
        });
        Ok(())
    }
}
