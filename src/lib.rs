//! trustgate: account authentication and session-trust engine.
//!
//! The crate implements the state machine from credentials to an issued
//! session: password login, email-verified registration, a TOTP second
//! factor with recovery codes and device-trust bypass, failure lockouts,
//! and rotating access/refresh tokens. HTTP routing, email delivery, and
//! the persistence backend are collaborators behind traits
//! ([`store::AccountStore`], [`services::EmailProvider`]).

pub mod config;
pub mod dtos;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::services::{
    AuthService, DeviceFingerprint, EmailProvider, EnrollmentService, JwtService, LockoutPolicy,
    SecretCodec, ServiceError, TotpEngine,
};
use crate::store::AccountStore;

/// The assembled engine: both orchestrators wired to one store, one codec,
/// and one configuration.
///
/// Construction is the startup boundary - missing or short secrets fail
/// here, never per-request.
#[derive(Clone)]
pub struct AuthEngine {
    pub auth: AuthService,
    pub enrollment: EnrollmentService,
}

impl AuthEngine {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn AccountStore>,
        email: Arc<dyn EmailProvider>,
    ) -> Result<Self, ServiceError> {
        let codec = Arc::new(SecretCodec::new(&config.security)?);
        let jwt = JwtService::new(&config.jwt)?;
        let totp = TotpEngine::new(config.security.totp_issuer.clone(), codec.clone());
        let fingerprint = DeviceFingerprint::new(&config.security)?;

        let password_lockout = LockoutPolicy::new(
            config.lockout.password_max_attempts,
            config.lockout.password_lock_minutes,
        );
        let second_factor_lockout = LockoutPolicy::new(
            config.lockout.second_factor_max_attempts,
            config.lockout.second_factor_lock_minutes,
        );

        let auth = AuthService::new(
            store.clone(),
            email,
            jwt,
            totp.clone(),
            fingerprint,
            password_lockout,
            second_factor_lockout,
        );
        let enrollment = EnrollmentService::new(store, totp, codec);

        Ok(Self { auth, enrollment })
    }
}
