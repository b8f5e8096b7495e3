//! Postgres-backed document store.
//!
//! A bucket's `store` map lives in a `jsonb` column. Single keys are written
//! with `jsonb_set` and removed with `-`, so each write is one row-level
//! `UPDATE` and concurrent writes to different keys never lose data.

use super::{Account, Bucket, BucketKey, DocumentStore, StoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    Connection, PgPool, Row,
};
use std::{collections::BTreeMap, time::Duration};
use tracing::{info_span, Instrument, Span};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn decode_bucket(row: &PgRow) -> Result<Bucket, StoreError> {
    let store: String = row.try_get("store")?;
    let store: BTreeMap<String, String> = serde_json::from_str(&store)?;
    Ok(Bucket {
        name: row.try_get("name")?,
        owner: row.try_get("owner")?,
        store,
    })
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool to `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// Apply the bundled schema.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        let mut connection = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection for schema setup")?;

        for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
            sqlx::query(statement)
                .execute(&mut *connection)
                .await
                .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
        }

        Ok(())
    }
}

/// Split a schema file on statement-terminating semicolons, dropping comments.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn find_account(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let query = "SELECT username, password_hash FROM accounts WHERE username = $1";
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        row.map(|row| -> Result<Account, StoreError> {
            Ok(Account {
                username: row.try_get("username")?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn insert_account(&self, account: &Account) -> Result<bool, StoreError> {
        // Only an incomplete record (empty hash) may be overwritten.
        let query = r"
            INSERT INTO accounts (username, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (username) DO UPDATE
                SET password_hash = EXCLUDED.password_hash
                WHERE accounts.password_hash = ''
        ";
        let result = sqlx::query(query)
            .bind(&account.username)
            .bind(&account.password_hash)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_buckets(&self, owner: &str) -> Result<Vec<Bucket>, StoreError> {
        let query =
            "SELECT name, owner, store::text AS store FROM buckets WHERE owner = $1 ORDER BY name";
        let rows = sqlx::query(query)
            .bind(owner)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        rows.iter().map(decode_bucket).collect()
    }

    async fn find_bucket(&self, key: &BucketKey) -> Result<Option<Bucket>, StoreError> {
        let query =
            "SELECT name, owner, store::text AS store FROM buckets WHERE name = $1 AND owner = $2";
        let row = sqlx::query(query)
            .bind(&key.name)
            .bind(&key.owner)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        row.as_ref().map(decode_bucket).transpose()
    }

    async fn create_bucket_if_absent(&self, key: &BucketKey) -> Result<bool, StoreError> {
        let query = r"
            INSERT INTO buckets (name, owner, store)
            VALUES ($1, $2, '{}'::jsonb)
            ON CONFLICT (name, owner) DO NOTHING
        ";
        let result = sqlx::query(query)
            .bind(&key.name)
            .bind(&key.owner)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_bucket(&self, key: &BucketKey) -> Result<bool, StoreError> {
        let query = "DELETE FROM buckets WHERE name = $1 AND owner = $2";
        let result = sqlx::query(query)
            .bind(&key.name)
            .bind(&key.owner)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_field(
        &self,
        key: &BucketKey,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE buckets
            SET store = jsonb_set(store, ARRAY[$3::text], to_jsonb($4::text), true)
            WHERE name = $1 AND owner = $2
        ";
        let result = sqlx::query(query)
            .bind(&key.name)
            .bind(&key.owner)
            .bind(field)
            .bind(value)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn unset_field(&self, key: &BucketKey, field: &str) -> Result<bool, StoreError> {
        let query = "UPDATE buckets SET store = store - $3::text WHERE name = $1 AND owner = $2";
        let result = sqlx::query(query)
            .bind(&key.name)
            .bind(&key.owner)
            .bind(field)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
