//! In-process document store.
//!
//! Used by tests and when the server runs without a DSN. Each operation takes
//! the write lock for exactly one document update, which gives the same
//! single-document atomicity the database backend provides.

use super::{Account, Bucket, BucketKey, DocumentStore, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
    buckets: RwLock<BTreeMap<BucketKey, BTreeMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

fn to_bucket(key: &BucketKey, store: &BTreeMap<String, String>) -> Bucket {
    Bucket {
        name: key.name.clone(),
        owner: key.owner.clone(),
        store: store.clone(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_account(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(username).cloned())
    }

    async fn insert_account(&self, account: &Account) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&account.username) {
            Some(existing) if existing.is_complete() => Ok(false),
            Some(existing) => {
                existing.password_hash.clone_from(&account.password_hash);
                Ok(true)
            }
            None => {
                accounts.insert(account.username.clone(), account.clone());
                Ok(true)
            }
        }
    }

    async fn find_buckets(&self, owner: &str) -> Result<Vec<Bucket>, StoreError> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.owner == owner)
            .map(|(key, store)| to_bucket(key, store))
            .collect())
    }

    async fn find_bucket(&self, key: &BucketKey) -> Result<Option<Bucket>, StoreError> {
        Ok(self
            .buckets
            .read()
            .await
            .get(key)
            .map(|store| to_bucket(key, store)))
    }

    async fn create_bucket_if_absent(&self, key: &BucketKey) -> Result<bool, StoreError> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(key) {
            return Ok(false);
        }
        buckets.insert(key.clone(), BTreeMap::new());
        Ok(true)
    }

    async fn delete_bucket(&self, key: &BucketKey) -> Result<bool, StoreError> {
        Ok(self.buckets.write().await.remove(key).is_some())
    }

    async fn set_field(
        &self,
        key: &BucketKey,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let mut buckets = self.buckets.write().await;
        let Some(store) = buckets.get_mut(key) else {
            return Ok(false);
        };
        store.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn unset_field(&self, key: &BucketKey, field: &str) -> Result<bool, StoreError> {
        let mut buckets = self.buckets.write().await;
        let Some(store) = buckets.get_mut(key) else {
            return Ok(false);
        };
        store.remove(field);
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
