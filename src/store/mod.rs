//! Persistent document store interface.
//!
//! Components never talk to a database directly; they receive an
//! `Arc<dyn DocumentStore>` at construction time. Every call is a single
//! document operation: there are no multi-document transactions.

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, future::Future, time::Duration};
use thiserror::Error;
use utoipa::ToSchema;

/// Default per-query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Persisted account record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    #[serde(rename = "passwordHash", skip_serializing)]
    pub password_hash: String,
}

impl Account {
    /// Records with an empty hash were only partially written and count as absent.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.password_hash.is_empty()
    }
}

/// Persisted bucket record.
///
/// Empty fields are left out of the JSON encoding, so a missing bucket is
/// rendered as `{}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Bucket {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub store: BTreeMap<String, String>,
}

impl Bucket {
    /// A bucket carrying only its identity, used to echo mutations back.
    #[must_use]
    pub fn identity(key: &BucketKey) -> Self {
        Self {
            name: key.name.clone(),
            owner: key.owner.clone(),
            store: BTreeMap::new(),
        }
    }

    /// The zero-value bucket means "no such bucket".
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.name.is_empty()
    }
}

/// The only address a bucket has: its name together with its owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub name: String,
    pub owner: String,
}

impl BucketKey {
    #[must_use]
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("invalid stored document")]
    Decode(#[from] serde_json::Error),
    #[error("document disappeared during update")]
    Vanished,
}

/// Capabilities the core needs from the persistence layer.
///
/// Field updates (`set_field`, `unset_field`) must be atomic with respect to
/// other fields of the same bucket; implementations must never rewrite the
/// whole `store` map from a value read earlier.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Find one account by username.
    async fn find_account(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Insert an account, or fill in the hash of an existing record whose hash
    /// is empty. Returns `false` when a complete account already exists.
    async fn insert_account(&self, account: &Account) -> Result<bool, StoreError>;

    /// Find every bucket owned by `owner`.
    async fn find_buckets(&self, owner: &str) -> Result<Vec<Bucket>, StoreError>;

    /// Find one bucket.
    async fn find_bucket(&self, key: &BucketKey) -> Result<Option<Bucket>, StoreError>;

    /// Create an empty bucket unless one exists. Returns `true` if created.
    async fn create_bucket_if_absent(&self, key: &BucketKey) -> Result<bool, StoreError>;

    /// Delete one bucket. Returns `true` if a bucket was removed.
    async fn delete_bucket(&self, key: &BucketKey) -> Result<bool, StoreError>;

    /// Set `store[field] = value`. Returns `false` if the bucket does not exist.
    async fn set_field(&self, key: &BucketKey, field: &str, value: &str)
        -> Result<bool, StoreError>;

    /// Remove `store[field]`. Returns `false` if the bucket does not exist.
    async fn unset_field(&self, key: &BucketKey, field: &str) -> Result<bool, StoreError>;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Run one store call under `limit`.
///
/// # Errors
/// Returns `StoreError::Timeout` if the call does not finish in time, or the
/// call's own error.
pub async fn timed<T, F>(limit: Duration, query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, query)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
