//! Services layer: orchestrators and the components they compose.

mod auth;
mod email;
mod enrollment;
pub mod error;
mod fingerprint;
mod jwt;
mod lockout;
mod secret;
mod totp;

pub use auth::AuthService;
pub use email::{EmailKind, EmailProvider, MockEmailService, SentEmail, SmtpEmailService};
pub use enrollment::{EnrollmentService, RECOVERY_CODE_COUNT};
pub use error::ServiceError;
pub use fingerprint::DeviceFingerprint;
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims, TokenPair};
pub use lockout::LockoutPolicy;
pub use secret::SecretCodec;
pub use totp::{GeneratedSecret, TotpEngine};
