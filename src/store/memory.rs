//! In-memory reference backend.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::Account;

use super::{AccountStore, StoreError};

/// DashMap-backed store. Per-account writes are serialized by the map's
/// entry locks; cross-write consistency comes from the version check in
/// `save`.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<Uuid, Account>,
    email_index: DashMap<String, Uuid>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: Account) -> Result<Account, StoreError> {
        match self.email_index.entry(account.email.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(account.id);
                self.accounts.insert(account.id, account.clone());
                Ok(account)
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self.email_index.get(email).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn save(&self, mut account: Account) -> Result<Account, StoreError> {
        let mut stored = self.accounts.get_mut(&account.id).ok_or(StoreError::NotFound)?;
        if stored.version != account.version {
            return Err(StoreError::VersionConflict);
        }
        account.version += 1;
        *stored = account.clone();
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CredentialSource;

    fn account(email: &str) -> Account {
        Account::new(email, CredentialSource::Password("$argon2id$stub".to_string()))
    }

    #[tokio::test]
    async fn insert_and_find_roundtrip() {
        let store = InMemoryAccountStore::new();
        let account = store.insert(account("a@example.com")).await.unwrap();

        let by_id = store.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "a@example.com");

        let by_email = store.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, account.id);

        assert!(store.find_by_email("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryAccountStore::new();
        store.insert(account("a@example.com")).await.unwrap();
        let err = store.insert(account("a@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn save_bumps_version() {
        let store = InMemoryAccountStore::new();
        let mut account = store.insert(account("a@example.com")).await.unwrap();
        assert_eq!(account.version, 0);

        account.verified = true;
        let saved = store.save(account).await.unwrap();
        assert_eq!(saved.version, 1);

        let reloaded = store.find_by_id(saved.id).await.unwrap().unwrap();
        assert!(reloaded.verified);
        assert_eq!(reloaded.version, 1);
    }

    #[tokio::test]
    async fn stale_save_is_a_version_conflict() {
        let store = InMemoryAccountStore::new();
        let inserted = store.insert(account("a@example.com")).await.unwrap();

        // Two readers load the same version.
        let mut first = store.find_by_id(inserted.id).await.unwrap().unwrap();
        let mut second = store.find_by_id(inserted.id).await.unwrap().unwrap();

        first.lockout.failed_attempts = 1;
        store.save(first).await.unwrap();

        // The second writer must not clobber the first increment.
        second.lockout.failed_attempts = 1;
        let err = store.save(second).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict));

        let reloaded = store.find_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(reloaded.lockout.failed_attempts, 1);
        assert_eq!(reloaded.version, 1);
    }

    #[tokio::test]
    async fn save_of_unknown_account_is_not_found() {
        let store = InMemoryAccountStore::new();
        let err = store.save(account("ghost@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
