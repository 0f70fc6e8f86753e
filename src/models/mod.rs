//! Domain model: the account aggregate and its owned records.

mod account;
mod lockout;
mod login_event;
mod pending_code;
mod refresh_token;
mod second_factor;
mod trusted_device;

pub use account::{Account, AccountStatus, AccountSummary, CredentialSource, Role};
pub use lockout::LockoutState;
pub use login_event::{ClientMetadata, LoginEvent, LOGIN_EVENT_LIMIT};
pub use pending_code::{CodePurpose, PendingCode, EMAIL_CODE_TTL_MINUTES};
pub use refresh_token::{RefreshTokenRecord, REFRESH_TOKEN_LIMIT};
pub use second_factor::{
    normalize_recovery_code, RecoveryCode, SecondFactorConfig, ENROLLMENT_WINDOW_MINUTES,
};
pub use trusted_device::TrustedDevice;
