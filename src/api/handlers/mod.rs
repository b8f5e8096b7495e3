//! HTTP adapters over the authenticator and the bucket service.
//!
//! Handlers translate requests into core calls and core errors into
//! `{error}` responses; they hold no business rules of their own.

pub mod buckets;
pub mod health;
pub mod login;
pub mod root;

pub use self::buckets::{delete_bucket, delete_key, get_bucket, list_buckets, upsert_key};
pub use self::health::health;
pub use self::login::login;
pub use self::root::root;

use crate::{
    auth::{AuthError, Claims, TokenIssuer},
    buckets::BucketError,
    error::ErrorKind,
};
use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::{any::Any, error::Error};
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    error: String,
}

/// Failure returned by a handler, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized.status(), "unauthorized")
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Log according to `kind` and keep only the top-level message for the caller.
    fn report<E: Error>(kind: ErrorKind, err: &E) -> Self {
        if kind.is_fault() {
            error!("{}", source_chain(err));
        } else {
            debug!("{}", err);
        }
        Self::new(kind.status(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::report(err.kind(), &err)
    }
}

impl From<BucketError> for ApiError {
    fn from(err: BucketError) -> Self {
        Self::report(err.kind(), &err)
    }
}

/// Response for a handler that panicked; the payload is logged, never returned.
#[allow(clippy::needless_pass_by_value)]
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!("handler panicked: {}", detail);

    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

fn source_chain(err: &dyn Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Resolve the caller from an `Authorization: Bearer <token>` header.
///
/// # Errors
/// Returns `401` if the header is missing, malformed, or the token does not
/// verify against the process signing key.
pub fn require_identity(headers: &HeaderMap, tokens: &TokenIssuer) -> Result<Claims, ApiError> {
    let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    else {
        debug!("Missing bearer token");
        return Err(ApiError::unauthorized());
    };

    tokens.verify(token).map_err(|err| {
        debug!("Rejected bearer token: {}", err);
        ApiError::unauthorized()
    })
}
