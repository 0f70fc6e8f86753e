//! Credential store abstraction.
//!
//! The account record is the only shared mutable resource in the engine.
//! Every mutation is a load -> compute -> save cycle; `save` is a
//! compare-and-swap on the account's `version`, and a `VersionConflict`
//! tells the orchestrator to re-read fresh state and re-decide.

mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Account;

pub use memory::InMemoryAccountStore;

/// How many load/decide/save cycles an orchestrator attempts before giving
/// up on a contended account.
pub const SAVE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account not found")]
    NotFound,

    #[error("email is already registered")]
    DuplicateEmail,

    #[error("account was modified concurrently")]
    VersionConflict,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. Fails with `DuplicateEmail` when the
    /// (case-insensitive) email key is taken.
    async fn insert(&self, account: Account) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Lookup by normalized (lowercased) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Persist a modified account. The write succeeds only when the stored
    /// version still equals `account.version`; the returned record carries
    /// the bumped version.
    async fn save(&self, account: Account) -> Result<Account, StoreError>;
}
