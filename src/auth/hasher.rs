//! One-way password hashing.

use thiserror::Error;
use tracing::warn;

/// bcrypt ignores everything past this many bytes, so longer passwords are
/// rejected by the caller instead of being silently truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

pub const DEFAULT_COST: u32 = 10;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("bcrypt failure")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hashing task failed")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl PasswordHasher {
    #[must_use]
    pub const fn new(cost: u32) -> Self {
        Self { cost }
    }

    #[must_use]
    pub const fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash `password` with a fresh salt.
    ///
    /// # Errors
    /// Returns `HashError` if bcrypt rejects the cost or fails internally.
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Check `password` against `digest`. A mismatch is `false`, never an error;
    /// an unparseable digest also counts as a mismatch.
    #[must_use]
    pub fn verify(&self, digest: &str, password: &str) -> bool {
        match bcrypt::verify(password, digest) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Stored password hash could not be parsed: {}", e);
                false
            }
        }
    }

    /// Run [`hash`](Self::hash) on the blocking pool.
    ///
    /// # Errors
    /// Returns `HashError` if hashing fails or the blocking task is lost.
    pub async fn hash_blocking(&self, password: String) -> Result<String, HashError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    /// Run [`verify`](Self::verify) on the blocking pool.
    ///
    /// # Errors
    /// Returns `HashError::Task` if the blocking task is lost.
    pub async fn verify_blocking(&self, digest: String, password: String) -> Result<bool, HashError> {
        let hasher = *self;
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&digest, &password)).await?)
    }
}
