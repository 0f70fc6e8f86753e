//! Account aggregate - the credential root and everything it owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lockout::LockoutState;
use super::login_event::{LoginEvent, LOGIN_EVENT_LIMIT};
use super::pending_code::{CodePurpose, PendingCode};
use super::refresh_token::{RefreshTokenRecord, REFRESH_TOKEN_LIMIT};
use super::second_factor::SecondFactorConfig;
use super::trusted_device::TrustedDevice;

/// Account role codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Account status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
    Pending,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Banned => "banned",
            AccountStatus::Pending => "pending",
        }
    }
}

/// What an account authenticates with. Password accounts carry an argon2id
/// hash; federated accounts carry the identity-provider subject instead.
/// The split makes "neither present" unrepresentable.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Password(String),
    Federated(String),
}

/// One account record: identity, credentials, and every owned sub-record.
///
/// All mutations follow load -> compute next state -> persist as one write;
/// `version` is the compare-and-swap handle the store checks on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Case-insensitive unique key, stored lowercased.
    pub email: String,
    pub password_hash: Option<String>,
    pub federated_id: Option<String>,
    pub verified: bool,
    pub role: Role,
    pub status: AccountStatus,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub pending_codes: Vec<PendingCode>,
    pub second_factor: SecondFactorConfig,
    pub trusted_devices: Vec<TrustedDevice>,
    pub login_events: Vec<LoginEvent>,
    pub refresh_tokens: Vec<RefreshTokenRecord>,
    pub lockout: LockoutState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Account {
    /// Create a new account. Starts pending and unverified; verification
    /// flips it active.
    pub fn new(email: &str, credential: CredentialSource) -> Self {
        let (password_hash, federated_id) = match credential {
            CredentialSource::Password(hash) => (Some(hash), None),
            CredentialSource::Federated(subject) => (None, Some(subject)),
        };
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: Self::normalize_email(email),
            password_hash,
            federated_id,
            verified: false,
            role: Role::User,
            status: AccountStatus::Pending,
            password_changed_at: None,
            pending_codes: Vec::new(),
            second_factor: SecondFactorConfig::default(),
            trusted_devices: Vec::new(),
            login_events: Vec::new(),
            refresh_tokens: Vec::new(),
            lockout: LockoutState::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn normalize_email(raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Append a login event, evicting the oldest past the bound.
    pub fn record_login_event(&mut self, event: LoginEvent) {
        self.login_events.push(event);
        if self.login_events.len() > LOGIN_EVENT_LIMIT {
            let excess = self.login_events.len() - LOGIN_EVENT_LIMIT;
            self.login_events.drain(..excess);
        }
    }

    /// Add a refresh token to the active set, evicting the oldest past the
    /// bound.
    pub fn push_refresh_token(&mut self, record: RefreshTokenRecord) {
        self.refresh_tokens.push(record);
        if self.refresh_tokens.len() > REFRESH_TOKEN_LIMIT {
            let excess = self.refresh_tokens.len() - REFRESH_TOKEN_LIMIT;
            self.refresh_tokens.drain(..excess);
        }
    }

    pub fn find_refresh_token(&self, id: Uuid) -> Option<&RefreshTokenRecord> {
        self.refresh_tokens.iter().find(|r| r.id == id)
    }

    /// Remove a refresh token from the active set. Returns whether it was
    /// present.
    pub fn remove_refresh_token(&mut self, id: Uuid) -> bool {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|r| r.id != id);
        self.refresh_tokens.len() != before
    }

    /// Refresh the last-used stamp of a matching active trusted device.
    /// Returns whether one matched.
    pub fn touch_trusted_device(&mut self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        match self
            .trusted_devices
            .iter_mut()
            .find(|d| d.active && d.fingerprint == fingerprint)
        {
            Some(device) => {
                device.last_used_at = now;
                true
            }
            None => false,
        }
    }

    /// Trust a device. Reusing a fingerprint refreshes the existing entry
    /// instead of duplicating it.
    pub fn trust_device(&mut self, device: TrustedDevice) {
        match self
            .trusted_devices
            .iter_mut()
            .find(|d| d.fingerprint == device.fingerprint)
        {
            Some(existing) => {
                existing.active = true;
                existing.last_used_at = device.last_used_at;
                existing.display_name = device.display_name;
                existing.user_agent = device.user_agent;
                existing.ip_address = device.ip_address;
            }
            None => self.trusted_devices.push(device),
        }
    }

    /// Deactivate a trusted device by fingerprint. Returns whether one was
    /// active.
    pub fn revoke_trusted_device(&mut self, fingerprint: &str) -> bool {
        match self
            .trusted_devices
            .iter_mut()
            .find(|d| d.active && d.fingerprint == fingerprint)
        {
            Some(device) => {
                device.active = false;
                true
            }
            None => false,
        }
    }

    /// Install an emailed code, replacing any live code with the same
    /// purpose.
    pub fn set_pending_code(&mut self, code: PendingCode) {
        self.pending_codes.retain(|c| c.purpose != code.purpose);
        self.pending_codes.push(code);
    }

    pub fn pending_code(&self, purpose: CodePurpose) -> Option<&PendingCode> {
        self.pending_codes.iter().find(|c| c.purpose == purpose)
    }

    pub fn clear_pending_code(&mut self, purpose: CodePurpose) {
        self.pending_codes.retain(|c| c.purpose != purpose);
    }

    /// Stamp the record before persisting.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Sanitized view handed back to callers (no hashes, no secrets).
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            email: self.email.clone(),
            verified: self.verified,
            role: self.role,
            status: self.status,
            second_factor_enabled: self.second_factor.enabled,
            created_at: self.created_at,
        }
    }
}

/// Account view without sensitive fields.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub email: String,
    pub verified: bool,
    pub role: Role,
    pub status: AccountStatus,
    pub second_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
}
