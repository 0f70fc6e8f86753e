//! Token issuer: short-lived access tokens, long-lived rotating refresh
//! tokens, both self-contained HS256-signed claims. Verification needs no
//! store lookup except the refresh-set membership check done by the caller.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Role;
use crate::services::error::ServiceError;

/// Minimum accepted signing secret, enforced at startup.
pub const MIN_SECRET_BYTES: usize = 32;

/// Claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (account id).
    pub sub: String,
    pub email: String,
    pub role: String,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Token id.
    pub jti: String,
}

/// Claims carried by refresh tokens. `jti` matches the account's stored
/// refresh-token record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// Token pair handed to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("access_token_expiry_minutes", &self.access_token_expiry_minutes)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .finish()
    }
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, ServiceError> {
        if config.secret.len() < MIN_SECRET_BYTES {
            return Err(ServiceError::Configuration(format!(
                "token signing secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        })
    }

    pub fn generate_access_token(
        &self,
        account_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("access token encode: {e}")))
    }

    pub fn generate_refresh_token(
        &self,
        account_id: Uuid,
        token_id: Uuid,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = RefreshTokenClaims {
            sub: account_id.to_string(),
            jti: token_id.to_string(),
            exp: (now + Duration::days(self.refresh_token_expiry_days)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("refresh token encode: {e}")))
    }

    /// Generate an access + refresh pair; the returned id is the refresh
    /// token's `jti`, to be stored in the account's active set.
    pub fn generate_token_pair(
        &self,
        account_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(TokenPair, Uuid), ServiceError> {
        let refresh_token_id = Uuid::new_v4();
        let access_token = self.generate_access_token(account_id, email, role)?;
        let refresh_token = self.generate_refresh_token(account_id, refresh_token_id)?;
        Ok((
            TokenPair {
                access_token,
                refresh_token,
                token_type: "Bearer".to_string(),
                expires_in: self.access_token_expiry_seconds(),
            },
            refresh_token_id,
        ))
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation())
            .map(|data| data.claims)
            .map_err(map_token_error)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, ServiceError> {
        decode::<RefreshTokenClaims>(token, &self.decoding_key, &validation())
            .map(|data| data.claims)
            .map_err(map_token_error)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation
}

fn map_token_error(err: jsonwebtoken::errors::Error) -> ServiceError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
        _ => ServiceError::TokenInvalid,
    }
}
