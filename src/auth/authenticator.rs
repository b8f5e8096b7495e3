//! Combined login and registration.
//!
//! Flow Overview: validate input, look the account up, then either create it
//! (unknown username, or a record left with an empty hash) or verify the
//! password against the stored hash. Both paths end by issuing a token.

use super::hasher::{HashError, PasswordHasher, MAX_PASSWORD_BYTES};
use super::token::{Claims, TokenError, TokenIssuer};
use crate::error::ErrorKind;
use crate::store::{timed, Account, DocumentStore, StoreError, DEFAULT_QUERY_TIMEOUT};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,
    #[error("password can't be greater than 72 characters")]
    PasswordTooLong,
    #[error("invalid password")]
    InvalidPassword,
    #[error("couldn't hash password")]
    Hash(#[source] HashError),
    #[error("couldn't find user")]
    Lookup(#[source] StoreError),
    #[error("couldn't create user")]
    Create(#[source] StoreError),
    #[error("couldn't issue token")]
    Token(#[source] TokenError),
}

impl AuthError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredentials | Self::PasswordTooLong => ErrorKind::BadRequest,
            Self::InvalidPassword => ErrorKind::Forbidden,
            Self::Hash(_) | Self::Lookup(_) | Self::Create(_) | Self::Token(_) => {
                ErrorKind::ServerFault
            }
        }
    }
}

/// Successful login: the bearer token and whether the account was just created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Login {
    pub token: String,
    pub created: bool,
}

#[derive(Debug)]
pub struct Authenticator {
    store: Arc<dyn DocumentStore>,
    tokens: Arc<TokenIssuer>,
    hasher: PasswordHasher,
    query_timeout: Duration,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        tokens: Arc<TokenIssuer>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            store,
            tokens,
            hasher,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sign `username` in, creating the account on first use.
    ///
    /// # Errors
    /// - `MissingCredentials` / `PasswordTooLong` before any store access,
    /// - `InvalidPassword` when the account exists and the password differs,
    /// - `Hash`, `Lookup`, `Create`, `Token` for infrastructure faults.
    #[instrument(skip(self, password))]
    pub async fn login_or_register(&self, username: &str, password: &str) -> Result<Login, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::PasswordTooLong);
        }

        let existing = timed(self.query_timeout, self.store.find_account(username))
            .await
            .map_err(AuthError::Lookup)?;

        let created = match existing {
            Some(account) if account.is_complete() => {
                self.check_password(account, password).await?;
                false
            }
            _ => self.create_account(username, password).await?,
        };

        let token = self
            .tokens
            .issue(&Claims::new(username))
            .map_err(AuthError::Token)?;

        Ok(Login { token, created })
    }

    async fn check_password(&self, account: Account, password: &str) -> Result<(), AuthError> {
        let matched = self
            .hasher
            .verify_blocking(account.password_hash, password.to_string())
            .await
            .map_err(AuthError::Hash)?;

        if matched {
            Ok(())
        } else {
            debug!("Password mismatch");
            Err(AuthError::InvalidPassword)
        }
    }

    /// Returns `true` if this call created the account. When a concurrent
    /// login created it first, the password is verified against that record.
    async fn create_account(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let password_hash = self
            .hasher
            .hash_blocking(password.to_string())
            .await
            .map_err(AuthError::Hash)?;

        let account = Account {
            username: username.to_string(),
            password_hash,
        };

        let inserted = timed(self.query_timeout, self.store.insert_account(&account))
            .await
            .map_err(AuthError::Create)?;

        if inserted {
            info!("Created account");
            return Ok(true);
        }

        debug!("Account created concurrently, verifying against stored record");
        let stored = timed(self.query_timeout, self.store.find_account(username))
            .await
            .map_err(AuthError::Lookup)?
            .filter(Account::is_complete)
            .ok_or(AuthError::Create(StoreError::Vanished))?;

        self.check_password(stored, password).await?;
        Ok(false)
    }
}
