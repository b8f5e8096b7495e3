use crate::{
    api,
    auth::{Authenticator, PasswordHasher, SigningKey, TokenIssuer},
    buckets::BucketService,
    cli::telemetry,
    store::{DocumentStore, MemoryStore, PostgresStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub query_timeout: Duration,
    pub request_timeout: Duration,
    pub bcrypt_cost: u32,
    pub ratelimit_requests: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the schema cannot be
/// applied, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store: Arc<dyn DocumentStore> = match &args.dsn {
        Some(dsn) => {
            let store = PostgresStore::connect(dsn.expose_secret()).await?;
            store
                .apply_schema()
                .await
                .context("Failed to apply database schema")?;
            Arc::new(store)
        }
        None => {
            warn!("No DSN configured, using the in-memory store; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // A fresh key per process: restarting invalidates every issued token.
    let tokens = Arc::new(TokenIssuer::new(&SigningKey::generate()));

    let authenticator = Authenticator::new(
        store.clone(),
        tokens.clone(),
        PasswordHasher::new(args.bcrypt_cost),
    )
    .with_query_timeout(args.query_timeout);

    let buckets = BucketService::new(store.clone()).with_query_timeout(args.query_timeout);

    let services = api::Services::new(authenticator, buckets, tokens, store)
        .with_rate_limiter(api::rate_limit::per_minute(args.ratelimit_requests));

    let result = api::new(args.port, services, args.request_timeout).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let store = args
        .dsn
        .as_ref()
        .map_or_else(|| "memory".to_string(), |dsn| dsn_host(dsn.expose_secret()));

    info!(
        port = args.port,
        store = %store,
        query_timeout = ?args.query_timeout,
        request_timeout = ?args.request_timeout,
        bcrypt_cost = args.bcrypt_cost,
        ratelimit_requests = args.ratelimit_requests,
        "Startup configuration"
    );
}

/// Only the host of a DSN is ever logged.
fn dsn_host(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(parsed) => parsed
            .host_str()
            .map_or_else(|| "unknown-host".to_string(), |host| format!("postgres@{host}")),
        Err(_) => "invalid-dsn".to_string(),
    }
}
