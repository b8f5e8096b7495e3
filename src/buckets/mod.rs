//! Per-user bucket operations.
//!
//! Every operation is scoped to the owner carried by verified [`Claims`];
//! a caller can never name another user's bucket.

use crate::auth::Claims;
use crate::error::ErrorKind;
use crate::store::{timed, Bucket, BucketKey, DocumentStore, StoreError, DEFAULT_QUERY_TIMEOUT};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("couldn't get buckets")]
    List(#[source] StoreError),
    #[error("couldn't get bucket")]
    Get(#[source] StoreError),
    #[error("couldn't delete bucket")]
    Delete(#[source] StoreError),
    #[error("couldn't upsert bucket")]
    Upsert(#[source] StoreError),
    #[error("couldn't unset key")]
    UnsetKey(#[source] StoreError),
}

impl BucketError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Upsert(_) => ErrorKind::Conflict,
            Self::List(_) | Self::Get(_) | Self::Delete(_) | Self::UnsetKey(_) => {
                ErrorKind::ServerFault
            }
        }
    }
}

/// Result of writing one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyWrite {
    pub key: String,
    pub value: String,
    pub bucket: Bucket,
}

/// Result of removing one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRemoval {
    pub key: String,
    pub bucket: Bucket,
}

#[derive(Debug)]
pub struct BucketService {
    store: Arc<dyn DocumentStore>,
    query_timeout: Duration,
}

impl BucketService {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// All buckets owned by the caller, possibly none.
    ///
    /// # Errors
    /// Returns `BucketError::List` if the store fails or times out.
    #[instrument(skip(self, claims), fields(owner = %claims.username))]
    pub async fn list_buckets(&self, claims: &Claims) -> Result<Vec<Bucket>, BucketError> {
        timed(self.query_timeout, self.store.find_buckets(&claims.username))
            .await
            .map_err(BucketError::List)
    }

    /// The caller's bucket `name`, or the empty bucket if there is none.
    ///
    /// # Errors
    /// Returns `BucketError::Get` if the store fails or times out.
    #[instrument(skip(self, claims), fields(owner = %claims.username))]
    pub async fn get_bucket(&self, claims: &Claims, name: &str) -> Result<Bucket, BucketError> {
        let key = BucketKey::new(name, claims.username.as_str());
        let bucket = timed(self.query_timeout, self.store.find_bucket(&key))
            .await
            .map_err(BucketError::Get)?;

        Ok(bucket.unwrap_or_else(|| {
            debug!("Bucket not found");
            Bucket::default()
        }))
    }

    /// Delete the caller's bucket `name`. Deleting a missing bucket succeeds.
    ///
    /// # Errors
    /// Returns `BucketError::Delete` if the store fails or times out.
    #[instrument(skip(self, claims), fields(owner = %claims.username))]
    pub async fn delete_bucket(&self, claims: &Claims, name: &str) -> Result<Bucket, BucketError> {
        let key = BucketKey::new(name, claims.username.as_str());
        let removed = timed(self.query_timeout, self.store.delete_bucket(&key))
            .await
            .map_err(BucketError::Delete)?;

        if !removed {
            debug!("Bucket did not exist");
        }
        Ok(Bucket::identity(&key))
    }

    /// Set `key = value` in the caller's bucket `name`, creating the bucket
    /// on first write. Other keys of the bucket are left untouched.
    ///
    /// # Errors
    /// Returns `BucketError::Upsert` if the store fails, times out, or the
    /// bucket is deleted between creation and the write.
    #[instrument(skip(self, claims, value), fields(owner = %claims.username))]
    pub async fn upsert_key(
        &self,
        claims: &Claims,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<KeyWrite, BucketError> {
        let bucket_key = BucketKey::new(name, claims.username.as_str());

        let created = timed(
            self.query_timeout,
            self.store.create_bucket_if_absent(&bucket_key),
        )
        .await
        .map_err(BucketError::Upsert)?;
        if created {
            debug!("Created bucket");
        }

        let updated = timed(
            self.query_timeout,
            self.store.set_field(&bucket_key, key, value),
        )
        .await
        .map_err(BucketError::Upsert)?;
        if !updated {
            return Err(BucketError::Upsert(StoreError::Vanished));
        }

        Ok(KeyWrite {
            key: key.to_string(),
            value: value.to_string(),
            bucket: Bucket::identity(&bucket_key),
        })
    }

    /// Remove `key` from the caller's bucket `name`. Removing a key that is
    /// not there, or from a bucket that does not exist, succeeds.
    ///
    /// # Errors
    /// Returns `BucketError::UnsetKey` if the store fails or times out.
    #[instrument(skip(self, claims), fields(owner = %claims.username))]
    pub async fn delete_key(
        &self,
        claims: &Claims,
        name: &str,
        key: &str,
    ) -> Result<KeyRemoval, BucketError> {
        let bucket_key = BucketKey::new(name, claims.username.as_str());
        let found = timed(self.query_timeout, self.store.unset_field(&bucket_key, key))
            .await
            .map_err(BucketError::UnsetKey)?;

        if !found {
            debug!("Bucket did not exist");
        }
        Ok(KeyRemoval {
            key: key.to_string(),
            bucket: Bucket::identity(&bucket_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        testing::{StalledStore, VanishingStore},
        MemoryStore,
    };
    use std::collections::BTreeMap;

    fn service() -> BucketService {
        BucketService::new(Arc::new(MemoryStore::new()))
    }

    fn alice() -> Claims {
        Claims::new("alice")
    }

    #[tokio::test]
    async fn new_user_has_no_buckets() -> Result<(), BucketError> {
        assert!(service().list_buckets(&alice()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn upsert_creates_bucket_and_echoes_identity() -> Result<(), BucketError> {
        let buckets = service();
        let write = buckets.upsert_key(&alice(), "notes", "color", "blue").await?;
        assert_eq!(write.key, "color");
        assert_eq!(write.value, "blue");
        assert_eq!(write.bucket, Bucket::identity(&BucketKey::new("notes", "alice")));

        let bucket = buckets.get_bucket(&alice(), "notes").await?;
        assert_eq!(bucket.owner, "alice");
        assert_eq!(bucket.store.get("color").map(String::as_str), Some("blue"));
        Ok(())
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_key() -> Result<(), BucketError> {
        let buckets = service();
        buckets.upsert_key(&alice(), "notes", "color", "blue").await?;
        buckets.upsert_key(&alice(), "notes", "color", "red").await?;

        let bucket = buckets.get_bucket(&alice(), "notes").await?;
        assert_eq!(bucket.store.len(), 1);
        assert_eq!(bucket.store.get("color").map(String::as_str), Some("red"));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_writes_to_different_keys_are_all_kept() -> Result<(), BucketError> {
        let buckets = service();
        let claims = alice();

        let (a, b, c) = tokio::join!(
            buckets.upsert_key(&claims, "notes", "a", "1"),
            buckets.upsert_key(&claims, "notes", "b", "2"),
            buckets.upsert_key(&claims, "notes", "c", "3"),
        );
        a?;
        b?;
        c?;

        let bucket = buckets.get_bucket(&claims, "notes").await?;
        let expected: BTreeMap<String, String> = [("a", "1"), ("b", "2"), ("c", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(bucket.store, expected);
        Ok(())
    }

    #[tokio::test]
    async fn owners_are_isolated() -> Result<(), BucketError> {
        let buckets = service();
        let bob = Claims::new("bob");

        buckets.upsert_key(&alice(), "notes", "color", "blue").await?;
        buckets.upsert_key(&bob, "notes", "color", "green").await?;

        let mine = buckets.get_bucket(&alice(), "notes").await?;
        let theirs = buckets.get_bucket(&bob, "notes").await?;
        assert_eq!(mine.store.get("color").map(String::as_str), Some("blue"));
        assert_eq!(theirs.store.get("color").map(String::as_str), Some("green"));

        buckets.delete_bucket(&bob, "notes").await?;
        assert!(buckets.get_bucket(&alice(), "notes").await?.exists());
        assert_eq!(buckets.list_buckets(&bob).await?.len(), 0);
        assert_eq!(buckets.list_buckets(&alice()).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_bucket_reads_as_empty() -> Result<(), BucketError> {
        let bucket = service().get_bucket(&alice(), "nothing").await?;
        assert_eq!(bucket, Bucket::default());
        Ok(())
    }

    #[tokio::test]
    async fn delete_key_leaves_other_keys() -> Result<(), BucketError> {
        let buckets = service();
        buckets.upsert_key(&alice(), "notes", "color", "blue").await?;
        buckets.upsert_key(&alice(), "notes", "size", "xl").await?;

        let removal = buckets.delete_key(&alice(), "notes", "color").await?;
        assert_eq!(removal.key, "color");
        assert_eq!(removal.bucket.name, "notes");

        let bucket = buckets.get_bucket(&alice(), "notes").await?;
        assert!(!bucket.store.contains_key("color"));
        assert_eq!(bucket.store.get("size").map(String::as_str), Some("xl"));
        Ok(())
    }

    #[tokio::test]
    async fn deletes_are_idempotent() -> Result<(), BucketError> {
        let buckets = service();
        buckets.delete_key(&alice(), "ghost", "color").await?;
        let echoed = buckets.delete_bucket(&alice(), "ghost").await?;
        assert_eq!(echoed, Bucket::identity(&BucketKey::new("ghost", "alice")));
        assert!(buckets.list_buckets(&alice()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn deleting_unset_key_leaves_bucket_intact() -> Result<(), BucketError> {
        let buckets = service();
        buckets.upsert_key(&alice(), "notes", "color", "blue").await?;
        buckets.upsert_key(&alice(), "notes", "size", "large").await?;

        let removal = buckets.delete_key(&alice(), "notes", "shape").await?;
        assert_eq!(removal.key, "shape");
        assert_eq!(removal.bucket, Bucket::identity(&BucketKey::new("notes", "alice")));

        let bucket = buckets.get_bucket(&alice(), "notes").await?;
        let expected: BTreeMap<String, String> = [("color", "blue"), ("size", "large")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(bucket.store, expected);
        Ok(())
    }

    #[tokio::test]
    async fn deleted_bucket_reads_as_empty() -> Result<(), BucketError> {
        let buckets = service();
        buckets.upsert_key(&alice(), "notes", "color", "blue").await?;
        buckets.delete_bucket(&alice(), "notes").await?;
        assert!(!buckets.get_bucket(&alice(), "notes").await?.exists());
        Ok(())
    }

    #[tokio::test]
    async fn dotted_keys_are_stored_literally() -> Result<(), BucketError> {
        let buckets = service();
        buckets.upsert_key(&alice(), "notes", "a.b", "1").await?;
        let bucket = buckets.get_bucket(&alice(), "notes").await?;
        assert_eq!(bucket.store.get("a.b").map(String::as_str), Some("1"));
        Ok(())
    }

    #[tokio::test]
    async fn vanished_bucket_is_a_conflict() {
        let buckets = BucketService::new(Arc::new(VanishingStore));
        let result = buckets.upsert_key(&alice(), "notes", "color", "blue").await;
        assert!(matches!(
            result,
            Err(BucketError::Upsert(StoreError::Vanished))
        ));
        assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::Conflict));
    }

    #[tokio::test]
    async fn store_timeout_is_a_server_fault() {
        let buckets = BucketService::new(Arc::new(StalledStore))
            .with_query_timeout(Duration::from_millis(20));
        let result = buckets.list_buckets(&alice()).await;
        assert!(matches!(result, Err(BucketError::List(StoreError::Timeout(_)))));
        assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::ServerFault));
    }
}
