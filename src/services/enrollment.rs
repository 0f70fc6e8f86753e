//! Enrollment orchestrator: turning the second factor on and off,
//! recovery-code regeneration, and trusted-device removal.
//!
//! Shares the credential store and secret codec with the login
//! orchestrator but is otherwise independent of it.

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::dtos::auth::EnrollmentStart;
use crate::models::{normalize_recovery_code, Account, RecoveryCode, SecondFactorConfig};
use crate::services::error::ServiceError;
use crate::services::secret::SecretCodec;
use crate::services::totp::TotpEngine;
use crate::store::{AccountStore, StoreError, SAVE_ATTEMPTS};
use crate::utils::password::verify_password;

/// Recovery codes issued per batch.
pub const RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_LEN: usize = 10;
const RECOVERY_CODE_GROUP: usize = 5;
// No 0/O/1/I: codes get read out loud and retyped.
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Clone)]
pub struct EnrollmentService {
    store: Arc<dyn AccountStore>,
    totp: TotpEngine,
    codec: Arc<SecretCodec>,
}

impl EnrollmentService {
    pub fn new(store: Arc<dyn AccountStore>, totp: TotpEngine, codec: Arc<SecretCodec>) -> Self {
        Self { store, totp, codec }
    }

    /// Start an enrollment: generate and encrypt a pending secret, mint a
    /// fresh recovery-code batch, and hand back the only plaintext copy the
    /// caller will ever see. Restarting discards any earlier pending
    /// secret.
    pub async fn start_enrollment(
        &self,
        account_id: Uuid,
    ) -> Result<EnrollmentStart, ServiceError> {
        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let mut account = self.load(account_id).await?;
            if account.second_factor.enabled {
                return Err(ServiceError::AlreadyEnabled);
            }

            let generated = self.totp.generate_secret(&account.email)?;
            let secret_enc = self.codec.encrypt(&generated.secret, account.id)?;
            let (plaintext_codes, hashed_codes) = generate_recovery_batch();

            account
                .second_factor
                .begin_enrollment(secret_enc, hashed_codes, now);

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "second factor enrollment started");
                    return Ok(EnrollmentStart {
                        provisioning_uri: generated.provisioning_uri,
                        manual_key: generated.base32,
                        recovery_codes: plaintext_codes,
                    });
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "enrollment start abandoned after repeated write conflicts"
        )))
    }

    /// Confirm a pending enrollment with a code from the authenticator.
    /// Verification runs against the pending secret specifically - never a
    /// stale permanent one.
    pub async fn confirm_enrollment(
        &self,
        account_id: Uuid,
        code: &str,
    ) -> Result<(), ServiceError> {
        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let mut account = self.load(account_id).await?;
            if account.second_factor.enabled {
                return Err(ServiceError::AlreadyEnabled);
            }

            let Some(pending_enc) = account.second_factor.pending_secret_enc.clone() else {
                return Err(ServiceError::EnrollmentNotInProgress);
            };
            if account.second_factor.pending_expired(now) {
                account.second_factor.abandon_pending();
                match self.persist(account).await? {
                    Some(_) => return Err(ServiceError::EnrollmentExpired),
                    None => continue,
                }
            }

            if !self.totp.verify_at(code, &pending_enc, account.id, now)? {
                return Err(ServiceError::InvalidSecondFactor);
            }

            account.second_factor.activate_pending(now);

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "second factor enabled");
                    return Ok(());
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "enrollment confirm abandoned after repeated write conflicts"
        )))
    }

    /// Disable the second factor. Destructive and irreversible: wipes the
    /// secret, recovery codes, counters, and the trusted-device list. A new
    /// enrollment starts from zero.
    pub async fn disable(
        &self,
        account_id: Uuid,
        password: &str,
        code: Option<&str>,
    ) -> Result<(), ServiceError> {
        for _ in 0..SAVE_ATTEMPTS {
            let now = Utc::now();
            let mut account = self.load(account_id).await?;
            self.require_password(&account, password)?;

            if !account.second_factor.enabled {
                return Err(ServiceError::NotEnabled);
            }

            if let Some(code) = code {
                let Some(secret_enc) = account.second_factor.secret_enc.clone() else {
                    return Err(ServiceError::Internal(anyhow::anyhow!(
                        "second factor enabled without a secret"
                    )));
                };
                if !self.totp.verify_at(code, &secret_enc, account.id, now)? {
                    return Err(ServiceError::InvalidSecondFactor);
                }
            }

            account.second_factor = SecondFactorConfig::default();
            account.trusted_devices.clear();

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "second factor disabled");
                    return Ok(());
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "disable abandoned after repeated write conflicts"
        )))
    }

    /// Replace every recovery code in one step; prior codes stop working
    /// even if unused. The new plaintext batch is returned exactly once.
    pub async fn regenerate_recovery_codes(
        &self,
        account_id: Uuid,
        password: &str,
    ) -> Result<Vec<String>, ServiceError> {
        for _ in 0..SAVE_ATTEMPTS {
            let mut account = self.load(account_id).await?;
            self.require_password(&account, password)?;

            if !account.second_factor.enabled {
                return Err(ServiceError::NotEnabled);
            }

            let (plaintext_codes, hashed_codes) = generate_recovery_batch();
            account.second_factor.replace_recovery_codes(hashed_codes);

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "recovery codes regenerated");
                    return Ok(plaintext_codes);
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "recovery code regeneration abandoned after repeated write conflicts"
        )))
    }

    /// Deactivate a trusted device by fingerprint.
    pub async fn remove_trusted_device(
        &self,
        account_id: Uuid,
        password: &str,
        fingerprint: &str,
    ) -> Result<(), ServiceError> {
        for _ in 0..SAVE_ATTEMPTS {
            let mut account = self.load(account_id).await?;
            self.require_password(&account, password)?;

            if !account.revoke_trusted_device(fingerprint) {
                return Err(ServiceError::Validation(
                    "unknown device fingerprint".to_string(),
                ));
            }

            match self.persist(account).await? {
                Some(saved) => {
                    tracing::info!(account_id = %saved.id, "trusted device removed");
                    return Ok(());
                }
                None => continue,
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "trusted device removal abandoned after repeated write conflicts"
        )))
    }

    async fn load(&self, account_id: Uuid) -> Result<Account, ServiceError> {
        self.store
            .find_by_id(account_id)
            .await?
            .ok_or(ServiceError::AccountNotFound)
    }

    /// Password re-verification for destructive operations. Failures here
    /// do not feed the login lockout counter.
    fn require_password(&self, account: &Account, password: &str) -> Result<(), ServiceError> {
        let Some(stored_hash) = account.password_hash.as_deref() else {
            return Err(ServiceError::InvalidCredentials);
        };
        if !verify_password(password, stored_hash)? {
            return Err(ServiceError::InvalidCredentials);
        }
        Ok(())
    }

    async fn persist(&self, mut account: Account) -> Result<Option<Account>, ServiceError> {
        account.touch();
        match self.store.save(account).await {
            Ok(saved) => Ok(Some(saved)),
            Err(StoreError::VersionConflict) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Generate a recovery-code batch: plaintext for the caller, hashes for
/// storage.
fn generate_recovery_batch() -> (Vec<String>, Vec<RecoveryCode>) {
    let mut plaintext = Vec::with_capacity(RECOVERY_CODE_COUNT);
    let mut hashed = Vec::with_capacity(RECOVERY_CODE_COUNT);
    for _ in 0..RECOVERY_CODE_COUNT {
        let code = generate_recovery_code();
        hashed.push(RecoveryCode::new(SecretCodec::hash_code(
            &normalize_recovery_code(&code),
        )));
        plaintext.push(code);
    }
    (plaintext, hashed)
}

/// One code in grouped display form, e.g. `XJ4KP-9WNRT`.
fn generate_recovery_code() -> String {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    OsRng.fill_bytes(&mut raw);

    let mut code = String::with_capacity(RECOVERY_CODE_LEN + 1);
    for (i, byte) in raw.iter().enumerate() {
        if i == RECOVERY_CODE_GROUP {
            code.push('-');
        }
        let idx = usize::from(*byte) % RECOVERY_CODE_ALPHABET.len();
        code.push(RECOVERY_CODE_ALPHABET[idx] as char);
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_has_ten_unique_codes() {
        let (plaintext, hashed) = generate_recovery_batch();
        assert_eq!(plaintext.len(), RECOVERY_CODE_COUNT);
        assert_eq!(hashed.len(), RECOVERY_CODE_COUNT);

        let mut sorted = plaintext.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), RECOVERY_CODE_COUNT);

        assert!(hashed.iter().all(|c| !c.used && c.used_at.is_none()));
    }

    #[test]
    fn codes_are_grouped_and_unambiguous() {
        for _ in 0..16 {
            let code = generate_recovery_code();
            assert_eq!(code.len(), RECOVERY_CODE_LEN + 1);
            assert_eq!(code.as_bytes()[RECOVERY_CODE_GROUP], b'-');
            for ch in code.chars().filter(|c| *c != '-') {
                assert!(RECOVERY_CODE_ALPHABET.contains(&(ch as u8)), "bad char {ch}");
            }
        }
    }

    #[test]
    fn stored_hash_matches_normalized_plaintext() {
        let (plaintext, hashed) = generate_recovery_batch();
        for (code, stored) in plaintext.iter().zip(hashed.iter()) {
            let normalized = normalize_recovery_code(code);
            assert!(SecretCodec::verify_code(&normalized, &stored.code_hash));
        }
    }
}
