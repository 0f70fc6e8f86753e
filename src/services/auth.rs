//! Login orchestrator: the state machine from credentials to an issued
//! session, plus the account-lifecycle flows that feed it (registration,
//! email verification, password reset/change) and session maintenance
//! (refresh rotation, logout).
//!
//! Every mutation runs as load -> decide -> save against a freshly read
//! account; `save` is a version compare-and-swap and a conflict restarts
//! the cycle so no counter update is lost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::auth::{
    mask_email, AuthenticatedSession, LoginOutcome, LoginRequest, RegisterReceipt,
    RegisterRequest, SecondFactorChallenge,
};
use crate::models::{
    normalize_recovery_code, Account, AccountStatus, CodePurpose, CredentialSource, LoginEvent,
    PendingCode, RefreshTokenRecord, SecondFactorConfig, TrustedDevice,
};
use crate::services::email::EmailProvider;
use crate::services::error::ServiceError;
use crate::services::fingerprint::DeviceFingerprint;
use crate::services::jwt::{JwtService, TokenPair};
use crate::services::lockout::LockoutPolicy;
use crate::services::secret::SecretCodec;
use crate::services::totp::{normalize_code, TotpEngine};
use crate::store::{AccountStore, StoreError, SAVE_ATTEMPTS};
use crate::utils::password::{hash_password, verify_password};

// Login-event reasons.
const REASON_BAD_PASSWORD: &str = "invalid password";
const REASON_BAD_SECOND_FACTOR: &str = "invalid second factor";
const REASON_SECOND_FACTOR_REQUIRED: &str = "second factor required";

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AccountStore>,
    email: Arc<dyn EmailProvider>,
    jwt: JwtService,
    totp: TotpEngine,
    fingerprint: DeviceFingerprint,
    password_lockout: LockoutPolicy,
    second_factor_lockout: LockoutPolicy,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn AccountStore>,
        email: Arc<dyn EmailProvider>,
        jwt: JwtService,
        totp: TotpEngine,
        fingerprint: DeviceFingerprint,
        password_lockout: LockoutPolicy,
        second_factor_lockout: LockoutPolicy,
    ) -> Self {
        Self {
            store,
            email,
            jwt,
            totp,
            fingerprint,
            password_lockout,
            second_factor_lockout,
        }
    }

    /// Run a login attempt to one of: an authenticated session, a
    /// second-factor challenge, or a typed failure.
    ///
    /// An unknown identifier and a wrong password are indistinguishable to
    /// the caller.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginOutcome, ServiceError> {
        req.validate().map_err(|_| ServiceError::InvalidCredentials)?;
        if req.totp_code.is_some() && req.recovery_code.is_some() {
            return Err(ServiceError::Validation(
                "supply either a one-time code or a recovery code, not both".to_string(),
            ));
        }

        let email = Account::normalize_email(&req.email);

        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let Some(mut account) = self.store.find_by_email(&email).await? else {
                return Err(ServiceError::InvalidCredentials);
            };

            // Account-level lock gates the password step entirely; a locked
            // attempt consumes nothing.
            if let Some(remaining) = self.password_lockout.remaining(&account.lockout, now) {
                return Err(ServiceError::AccountLocked {
                    retry_after: remaining,
                });
            }

            // Federated-only accounts have no password to check.
            let Some(stored_hash) = account.password_hash.clone() else {
                return Err(ServiceError::InvalidCredentials);
            };

            if !verify_password(&req.password, &stored_hash)? {
                account.lockout = self.password_lockout.record_failure(&account.lockout, now);
                account.record_login_event(LoginEvent::failure(&req.client, REASON_BAD_PASSWORD));
                match self.persist(account).await? {
                    Some(_) => return Err(ServiceError::InvalidCredentials),
                    None => continue,
                }
            }

            match account.status {
                AccountStatus::Suspended | AccountStatus::Banned => {
                    return Err(ServiceError::AccountDisabled);
                }
                AccountStatus::Active | AccountStatus::Pending => {}
            }
            if !account.verified {
                return Err(ServiceError::EmailNotVerified);
            }

            if account.second_factor.enabled {
                let fp = self.fingerprint.compute(&req.client);
                if account.touch_trusted_device(&fp, now) {
                    // Trusted device: second factor bypassed.
                } else if req.totp_code.is_none() && req.recovery_code.is_none() {
                    // Checkpoint, not a failure: no counter moves.
                    account.record_login_event(LoginEvent::failure(
                        &req.client,
                        REASON_SECOND_FACTOR_REQUIRED,
                    ));
                    let challenge = SecondFactorChallenge {
                        account_ref: account.id,
                        email_hint: mask_email(&account.email),
                    };
                    match self.persist(account).await? {
                        Some(_) => return Ok(LoginOutcome::SecondFactorRequired(challenge)),
                        None => continue,
                    }
                } else {
                    if let Some(remaining) = self
                        .second_factor_lockout
                        .remaining(&account.second_factor.lockout, now)
                    {
                        return Err(ServiceError::AccountLocked {
                            retry_after: remaining,
                        });
                    }

                    let verified = self.check_second_factor(&account, &req, now)?;
                    if !verified {
                        account.second_factor.lockout = self
                            .second_factor_lockout
                            .record_failure(&account.second_factor.lockout, now);
                        account.record_login_event(LoginEvent::failure(
                            &req.client,
                            REASON_BAD_SECOND_FACTOR,
                        ));
                        match self.persist(account).await? {
                            Some(_) => return Err(ServiceError::InvalidSecondFactor),
                            None => continue,
                        }
                    }

                    if req.recovery_code.is_some() {
                        consume_recovery_code(
                            &mut account.second_factor,
                            req.recovery_code.as_deref().unwrap_or_default(),
                            now,
                        );
                    }
                    account.second_factor.record_use(now);

                    // Device trust is established only after a successful
                    // second-factor check.
                    if req.trust_device {
                        account.trust_device(TrustedDevice::new(fp, &req.client, now));
                    }
                }
            }

            let (pair, refresh_id) =
                self.jwt
                    .generate_token_pair(account.id, &account.email, account.role)?;
            account.push_refresh_token(RefreshTokenRecord::new(refresh_id, &pair.refresh_token, now));
            account.lockout = self.password_lockout.reset();
            account.record_login_event(LoginEvent::success(&req.client));

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "login succeeded");
                    return Ok(LoginOutcome::Authenticated(AuthenticatedSession {
                        account: saved.summary(),
                        tokens: pair,
                    }));
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "login abandoned after repeated write conflicts"
        )))
    }

    /// Validate a bearer access token and return its claims. Self-contained:
    /// no store lookup.
    pub fn verify_access_token(
        &self,
        token: &str,
    ) -> Result<crate::services::jwt::AccessTokenClaims, ServiceError> {
        self.jwt.validate_access_token(token)
    }

    /// Rotate a refresh token: the presented token must be a member of the
    /// account's active set; it is replaced by a fresh pair in one write.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let claims = self.jwt.validate_refresh_token(refresh_token)?;
        let account_id = parse_uuid(&claims.sub)?;
        let token_id = parse_uuid(&claims.jti)?;

        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let Some(mut account) = self.store.find_by_id(account_id).await? else {
                return Err(ServiceError::TokenInvalid);
            };

            let Some(record) = account.find_refresh_token(token_id) else {
                return Err(ServiceError::TokenInvalid);
            };
            if !record.matches(refresh_token) {
                tracing::warn!(account_id = %account.id, "refresh token hash mismatch");
                return Err(ServiceError::TokenInvalid);
            }

            match account.status {
                AccountStatus::Suspended | AccountStatus::Banned => {
                    return Err(ServiceError::AccountDisabled);
                }
                AccountStatus::Active | AccountStatus::Pending => {}
            }
            if !account.verified {
                return Err(ServiceError::EmailNotVerified);
            }

            account.remove_refresh_token(token_id);
            let (pair, new_id) =
                self.jwt
                    .generate_token_pair(account.id, &account.email, account.role)?;
            account.push_refresh_token(RefreshTokenRecord::new(new_id, &pair.refresh_token, now));

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "session refreshed");
                    return Ok(pair);
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "refresh abandoned after repeated write conflicts"
        )))
    }

    /// Remove a refresh token from its account's active set. Removing a
    /// token that is already gone is a success; only a bad signature is an
    /// error, and an expired token has nothing left to revoke.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ServiceError> {
        let claims = match self.jwt.validate_refresh_token(refresh_token) {
            Ok(claims) => claims,
            Err(ServiceError::TokenExpired) => return Ok(()),
            Err(e) => return Err(e),
        };
        let account_id = parse_uuid(&claims.sub)?;
        let token_id = parse_uuid(&claims.jti)?;

        for _ in 0..SAVE_ATTEMPTS {
            let Some(mut account) = self.store.find_by_id(account_id).await? else {
                return Ok(());
            };
            if !account.remove_refresh_token(token_id) {
                return Ok(());
            }
            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "logged out");
                    return Ok(());
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "logout abandoned after repeated write conflicts"
        )))
    }

    /// Create a pending, unverified account and email a verification code.
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterReceipt, ServiceError> {
        req.validate()?;
        let email = Account::normalize_email(&req.email);

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let now = Utc::now();
        let password_hash = hash_password(&req.password)?;
        let mut account = Account::new(&email, CredentialSource::Password(password_hash));

        let code = generate_email_code();
        account.set_pending_code(PendingCode::new(
            CodePurpose::EmailVerification,
            SecretCodec::hash_code(&code),
            now,
        ));

        let account = match self.store.insert(account).await {
            Ok(account) => account,
            Err(StoreError::DuplicateEmail) => return Err(ServiceError::EmailAlreadyRegistered),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(account_id = %account.id, "account registered");
        self.dispatch_verification_code(account.email.clone(), code);

        Ok(RegisterReceipt {
            account_id: account.id,
            email: account.email,
        })
    }

    /// Confirm an emailed verification code: flips the account verified and
    /// active. Unknown emails and wrong codes are indistinguishable.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        let email = Account::normalize_email(email);
        let Some(code) = normalize_code(code) else {
            return Err(ServiceError::TokenInvalid);
        };

        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let Some(mut account) = self.store.find_by_email(&email).await? else {
                return Err(ServiceError::TokenInvalid);
            };
            if account.verified {
                return Ok(());
            }

            let Some(pending) = account.pending_code(CodePurpose::EmailVerification).cloned()
            else {
                return Err(ServiceError::TokenInvalid);
            };
            if pending.is_expired(now) {
                account.clear_pending_code(CodePurpose::EmailVerification);
                match self.persist(account).await? {
                    Some(_) => return Err(ServiceError::TokenExpired),
                    None => continue,
                }
            }
            if !SecretCodec::verify_code(&code, &pending.code_hash) {
                return Err(ServiceError::TokenInvalid);
            }

            account.verified = true;
            if account.status == AccountStatus::Pending {
                account.status = AccountStatus::Active;
            }
            account.clear_pending_code(CodePurpose::EmailVerification);

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "email verified");
                    self.dispatch_welcome(saved.email);
                    return Ok(());
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "verification abandoned after repeated write conflicts"
        )))
    }

    /// Email a password-reset code. Always succeeds from the caller's view;
    /// whether the account exists is not revealed.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let email = Account::normalize_email(email);

        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let Some(mut account) = self.store.find_by_email(&email).await? else {
                return Ok(());
            };
            // Federated accounts have no password to reset.
            if account.password_hash.is_none() {
                return Ok(());
            }

            let code = generate_email_code();
            account.set_pending_code(PendingCode::new(
                CodePurpose::PasswordReset,
                SecretCodec::hash_code(&code),
                now,
            ));

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "password reset requested");
                    self.dispatch_reset_code(saved.email, code);
                    return Ok(());
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "password reset request abandoned after repeated write conflicts"
        )))
    }

    /// Consume a reset code and install a new password. Every outstanding
    /// refresh token is revoked; recovering by email also clears an active
    /// password lock.
    pub async fn confirm_password_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        validate_new_password(new_password)?;
        let email = Account::normalize_email(email);
        let Some(code) = normalize_code(code) else {
            return Err(ServiceError::TokenInvalid);
        };

        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let Some(mut account) = self.store.find_by_email(&email).await? else {
                return Err(ServiceError::TokenInvalid);
            };

            let Some(pending) = account.pending_code(CodePurpose::PasswordReset).cloned() else {
                return Err(ServiceError::TokenInvalid);
            };
            if pending.is_expired(now) {
                account.clear_pending_code(CodePurpose::PasswordReset);
                match self.persist(account).await? {
                    Some(_) => return Err(ServiceError::TokenExpired),
                    None => continue,
                }
            }
            if !SecretCodec::verify_code(&code, &pending.code_hash) {
                return Err(ServiceError::TokenInvalid);
            }

            account.password_hash = Some(hash_password(new_password)?);
            account.password_changed_at = Some(now);
            account.clear_pending_code(CodePurpose::PasswordReset);
            account.refresh_tokens.clear();
            account.lockout = self.password_lockout.reset();

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "password reset completed");
                    return Ok(());
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "password reset abandoned after repeated write conflicts"
        )))
    }

    /// Replace the password after re-verifying the current one. Every
    /// outstanding refresh token is revoked.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        validate_new_password(new_password)?;

        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let Some(mut account) = self.store.find_by_id(account_id).await? else {
                return Err(ServiceError::AccountNotFound);
            };
            let Some(stored_hash) = account.password_hash.clone() else {
                return Err(ServiceError::InvalidCredentials);
            };
            if !verify_password(current_password, &stored_hash)? {
                return Err(ServiceError::InvalidCredentials);
            }

            account.password_hash = Some(hash_password(new_password)?);
            account.password_changed_at = Some(now);
            account.refresh_tokens.clear();

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "password changed");
                    return Ok(());
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "password change abandoned after repeated write conflicts"
        )))
    }

    /// Verify the submitted second factor without mutating anything.
    /// Recovery-code consumption happens on the already-loaded account
    /// after this returns true.
    fn check_second_factor(
        &self,
        account: &Account,
        req: &LoginRequest,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        if let Some(code) = req.totp_code.as_deref() {
            let Some(secret_enc) = account.second_factor.secret_enc.as_deref() else {
                return Err(ServiceError::Internal(anyhow::anyhow!(
                    "second factor enabled without a secret"
                )));
            };
            return self.totp.verify_at(code, secret_enc, account.id, now);
        }
        if let Some(code) = req.recovery_code.as_deref() {
            let normalized = normalize_recovery_code(code);
            return Ok(account
                .second_factor
                .recovery_codes
                .iter()
                .any(|rc| !rc.used && SecretCodec::verify_code(&normalized, &rc.code_hash)));
        }
        Ok(false)
    }

    /// Save with conflict detection: `Ok(Some)` on success, `Ok(None)` when
    /// the caller should re-read and re-decide.
    async fn persist(&self, mut account: Account) -> Result<Option<Account>, ServiceError> {
        account.touch();
        match self.store.save(account).await {
            Ok(saved) => Ok(Some(saved)),
            Err(StoreError::VersionConflict) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn dispatch_verification_code(&self, to: String, code: String) {
        let email = self.email.clone();
        tokio::spawn(async move {
            if let Err(e) = email.send_verification_code(&to, &code).await {
                tracing::error!(error = %e, to = %to, "verification email failed");
            }
        });
    }

    fn dispatch_reset_code(&self, to: String, code: String) {
        let email = self.email.clone();
        tokio::spawn(async move {
            if let Err(e) = email.send_password_reset_code(&to, &code).await {
                tracing::error!(error = %e, to = %to, "password reset email failed");
            }
        });
    }

    fn dispatch_welcome(&self, to: String) {
        let email = self.email.clone();
        tokio::spawn(async move {
            if let Err(e) = email.send_welcome(&to).await {
                tracing::error!(error = %e, to = %to, "welcome email failed");
            }
        });
    }
}

/// Mark the matching recovery code used. Sibling codes are untouched.
fn consume_recovery_code(config: &mut SecondFactorConfig, raw: &str, now: DateTime<Utc>) -> bool {
    let normalized = normalize_recovery_code(raw);
    for rc in config.recovery_codes.iter_mut() {
        if !rc.used && SecretCodec::verify_code(&normalized, &rc.code_hash) {
            rc.used = true;
            rc.used_at = Some(now);
            return true;
        }
    }
    false
}

fn validate_new_password(password: &str) -> Result<(), ServiceError> {
    if password.len() < 8 || password.len() > 128 {
        return Err(ServiceError::Validation(
            "password must be between 8 and 128 characters".to_string(),
        ));
    }
    Ok(())
}

fn generate_email_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

fn parse_uuid(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::TokenInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecoveryCode;

    #[test]
    fn email_codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_email_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn consume_marks_only_the_matching_code() {
        let now = Utc::now();
        let mut config = SecondFactorConfig {
            recovery_codes: vec![
                RecoveryCode::new(SecretCodec::hash_code("AAAAABBBBB")),
                RecoveryCode::new(SecretCodec::hash_code("CCCCCDDDDD")),
            ],
            ..Default::default()
        };

        assert!(consume_recovery_code(&mut config, "aaaaa-bbbbb", now));
        assert!(config.recovery_codes[0].used);
        assert!(config.recovery_codes[0].used_at.is_some());
        assert!(!config.recovery_codes[1].used);

        // Strictly single-use: a consumed code stays rejected.
        assert!(!consume_recovery_code(&mut config, "aaaaa-bbbbb", now));
        assert!(consume_recovery_code(&mut config, "ccccc-ddddd", now));
    }

    #[test]
    fn new_password_bounds_are_enforced() {
        assert!(validate_new_password("p@ss1234").is_ok());
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password(&"x".repeat(129)).is_err());
    }
}
