//! Store doubles for failure-path tests.

use super::{Account, Bucket, BucketKey, DocumentStore, StoreError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Panics on any call; proves validation happens before store access.
#[derive(Debug)]
pub struct UntouchableStore;

#[async_trait]
impl DocumentStore for UntouchableStore {
    async fn find_account(&self, _: &str) -> Result<Option<Account>, StoreError> {
        panic!("store must not be reached")
    }
    async fn insert_account(&self, _: &Account) -> Result<bool, StoreError> {
        panic!("store must not be reached")
    }
    async fn find_buckets(&self, _: &str) -> Result<Vec<Bucket>, StoreError> {
        panic!("store must not be reached")
    }
    async fn find_bucket(&self, _: &BucketKey) -> Result<Option<Bucket>, StoreError> {
        panic!("store must not be reached")
    }
    async fn create_bucket_if_absent(&self, _: &BucketKey) -> Result<bool, StoreError> {
        panic!("store must not be reached")
    }
    async fn delete_bucket(&self, _: &BucketKey) -> Result<bool, StoreError> {
        panic!("store must not be reached")
    }
    async fn set_field(&self, _: &BucketKey, _: &str, _: &str) -> Result<bool, StoreError> {
        panic!("store must not be reached")
    }
    async fn unset_field(&self, _: &BucketKey, _: &str) -> Result<bool, StoreError> {
        panic!("store must not be reached")
    }
    async fn ping(&self) -> Result<(), StoreError> {
        panic!("store must not be reached")
    }
}

/// Never answers; exercises the per-query timeout.
#[derive(Debug)]
pub struct StalledStore;

#[async_trait]
impl DocumentStore for StalledStore {
    async fn find_account(&self, _: &str) -> Result<Option<Account>, StoreError> {
        std::future::pending().await
    }
    async fn insert_account(&self, _: &Account) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn find_buckets(&self, _: &str) -> Result<Vec<Bucket>, StoreError> {
        std::future::pending().await
    }
    async fn find_bucket(&self, _: &BucketKey) -> Result<Option<Bucket>, StoreError> {
        std::future::pending().await
    }
    async fn create_bucket_if_absent(&self, _: &BucketKey) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn delete_bucket(&self, _: &BucketKey) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn set_field(&self, _: &BucketKey, _: &str, _: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn unset_field(&self, _: &BucketKey, _: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        std::future::pending().await
    }
}

/// Creates buckets but loses them before any field update lands, as if a
/// concurrent delete ran between the two calls of an upsert.
#[derive(Debug)]
pub struct VanishingStore;

#[async_trait]
impl DocumentStore for VanishingStore {
    async fn find_account(&self, _: &str) -> Result<Option<Account>, StoreError> {
        Ok(None)
    }
    async fn insert_account(&self, _: &Account) -> Result<bool, StoreError> {
        Ok(true)
    }
    async fn find_buckets(&self, _: &str) -> Result<Vec<Bucket>, StoreError> {
        Ok(Vec::new())
    }
    async fn find_bucket(&self, _: &BucketKey) -> Result<Option<Bucket>, StoreError> {
        Ok(None)
    }
    async fn create_bucket_if_absent(&self, _: &BucketKey) -> Result<bool, StoreError> {
        Ok(true)
    }
    async fn delete_bucket(&self, _: &BucketKey) -> Result<bool, StoreError> {
        Ok(false)
    }
    async fn set_field(&self, _: &BucketKey, _: &str, _: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
    async fn unset_field(&self, _: &BucketKey, _: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Loses the insert race: the first lookup misses, the insert reports an
/// existing record, and every later lookup returns `winner`.
#[derive(Debug)]
pub struct RacingStore {
    winner: Option<Account>,
    lookups: AtomicUsize,
}

impl RacingStore {
    pub fn new(winner: Option<Account>) -> Self {
        Self {
            winner,
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for RacingStore {
    async fn find_account(&self, _: &str) -> Result<Option<Account>, StoreError> {
        if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(None)
        } else {
            Ok(self.winner.clone())
        }
    }
    async fn insert_account(&self, _: &Account) -> Result<bool, StoreError> {
        Ok(false)
    }
    async fn find_buckets(&self, _: &str) -> Result<Vec<Bucket>, StoreError> {
        panic!("bucket access during login")
    }
    async fn find_bucket(&self, _: &BucketKey) -> Result<Option<Bucket>, StoreError> {
        panic!("bucket access during login")
    }
    async fn create_bucket_if_absent(&self, _: &BucketKey) -> Result<bool, StoreError> {
        panic!("bucket access during login")
    }
    async fn delete_bucket(&self, _: &BucketKey) -> Result<bool, StoreError> {
        panic!("bucket access during login")
    }
    async fn set_field(&self, _: &BucketKey, _: &str, _: &str) -> Result<bool, StoreError> {
        panic!("bucket access during login")
    }
    async fn unset_field(&self, _: &BucketKey, _: &str) -> Result<bool, StoreError> {
        panic!("bucket access during login")
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
