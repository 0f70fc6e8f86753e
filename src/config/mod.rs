//! Engine configuration, loaded once at startup.
//!
//! Every secret and knob lives in this struct and is passed by reference
//! into the components that need it; nothing re-reads the process
//! environment at call sites. Missing or short secrets abort construction.

use std::env;

use serde::Deserialize;

use crate::services::error::ServiceError;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub smtp: SmtpConfig,
    pub lockout: LockoutConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Key material for the secret codec (TOTP secret at rest).
    pub encryption_key: String,
    /// Key material for device-fingerprint HMACs.
    pub fingerprint_key: String,
    /// Issuer label rendered into provisioning URIs.
    pub totp_issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub app_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub password_max_attempts: u32,
    pub password_lock_minutes: i64,
    pub second_factor_max_attempts: u32,
    pub second_factor_lock_minutes: i64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(ServiceError::Configuration)?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("trustgate"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            jwt: JwtConfig {
                secret: get_env(
                    "JWT_SECRET",
                    Some("dev-only-signing-secret-0123456789abcdef"),
                    is_prod,
                )?,
                access_token_expiry_minutes: parse_i64(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    get_env("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", Some("15"), is_prod)?,
                )?,
                refresh_token_expiry_days: parse_i64(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    get_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", Some("7"), is_prod)?,
                )?,
            },
            security: SecurityConfig {
                encryption_key: get_env(
                    "ENCRYPTION_KEY",
                    Some("dev-only-encryption-key-0123456789abcdef"),
                    is_prod,
                )?,
                fingerprint_key: get_env(
                    "FINGERPRINT_KEY",
                    Some("dev-only-fingerprint-key-0123456789"),
                    is_prod,
                )?,
                totp_issuer: get_env("TOTP_ISSUER", Some("trustgate"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                user: get_env("SMTP_USER", Some("dev@localhost"), is_prod)?,
                app_password: get_env("SMTP_APP_PASSWORD", Some(""), is_prod)?,
            },
            lockout: LockoutConfig {
                password_max_attempts: parse_u32(
                    "LOCKOUT_PASSWORD_MAX_ATTEMPTS",
                    get_env("LOCKOUT_PASSWORD_MAX_ATTEMPTS", Some("5"), is_prod)?,
                )?,
                password_lock_minutes: parse_i64(
                    "LOCKOUT_PASSWORD_LOCK_MINUTES",
                    get_env("LOCKOUT_PASSWORD_LOCK_MINUTES", Some("30"), is_prod)?,
                )?,
                second_factor_max_attempts: parse_u32(
                    "LOCKOUT_SECOND_FACTOR_MAX_ATTEMPTS",
                    get_env("LOCKOUT_SECOND_FACTOR_MAX_ATTEMPTS", Some("5"), is_prod)?,
                )?,
                second_factor_lock_minutes: parse_i64(
                    "LOCKOUT_SECOND_FACTOR_LOCK_MINUTES",
                    get_env("LOCKOUT_SECOND_FACTOR_LOCK_MINUTES", Some("15"), is_prod)?,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(ServiceError::Configuration(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive".to_string(),
            ));
        }
        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(ServiceError::Configuration(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive".to_string(),
            ));
        }
        if self.lockout.password_max_attempts == 0 || self.lockout.second_factor_max_attempts == 0 {
            return Err(ServiceError::Configuration(
                "lockout thresholds must be positive".to_string(),
            ));
        }
        if self.lockout.password_lock_minutes <= 0 || self.lockout.second_factor_lock_minutes <= 0 {
            return Err(ServiceError::Configuration(
                "lockout durations must be positive".to_string(),
            ));
        }
        // Key length floors live with the consuming components
        // (SecretCodec, DeviceFingerprint, JwtService).
        Ok(())
    }
}

/// Initialize structured logging. `log_level` is an env-filter directive.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, ServiceError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ServiceError::Configuration(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ServiceError::Configuration(format!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_i64(key: &str, value: String) -> Result<i64, ServiceError> {
    value
        .parse()
        .map_err(|e| ServiceError::Configuration(format!("{}: {}", key, e)))
}

fn parse_u32(key: &str, value: String) -> Result<u32, ServiceError> {
    value
        .parse()
        .map_err(|e| ServiceError::Configuration(format!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("invalid environment: {}", s)),
        }
    }
}
