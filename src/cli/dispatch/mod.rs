use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .filter(|dsn| !dsn.is_empty())
        .map(|dsn| SecretString::from(dsn.clone()));
    let query_timeout = matches
        .get_one::<u64>("query-timeout")
        .copied()
        .context("missing required argument: --query-timeout")?;
    let request_timeout = matches
        .get_one::<u64>("request-timeout")
        .copied()
        .context("missing required argument: --request-timeout")?;
    let bcrypt_cost = matches
        .get_one::<u32>("bcrypt-cost")
        .copied()
        .context("missing required argument: --bcrypt-cost")?;
    let ratelimit_requests = matches
        .get_one::<u32>("ratelimit-requests")
        .copied()
        .context("missing required argument: --ratelimit-requests")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        query_timeout: Duration::from_secs(query_timeout),
        request_timeout: Duration::from_secs(request_timeout),
        bcrypt_cost,
        ratelimit_requests,
    }))
}
