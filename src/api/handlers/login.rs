use super::{ApiError, ErrorBody};
use crate::auth::Authenticator;
use axum::{extract::Extension, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    token: String,
}

#[utoipa::path(
    post,
    path= "/api/v1/auth/login",
    request_body = Credentials,
    responses (
        (status = 200, description = "Existing account, password verified", body = LoginResponse),
        (status = 201, description = "Account created on first login", body = LoginResponse),
        (status = 400, description = "Missing or oversized credentials", body = ErrorBody),
        (status = 403, description = "Wrong password", body = ErrorBody),
        (status = 500, description = "Hashing or storage failure", body = ErrorBody),
    ),
    tag= "auth"
)]
// axum handler for login
#[instrument(skip(authenticator, payload))]
pub async fn login(
    authenticator: Extension<Arc<Authenticator>>,
    payload: Option<Json<Credentials>>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let Some(Json(credentials)) = payload else {
        debug!("Missing or invalid login payload");
        return Err(ApiError::bad_request("invalid request body"));
    };

    let login = authenticator
        .login_or_register(&credentials.username, &credentials.password)
        .await?;

    let status = if login.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(LoginResponse { token: login.token })))
}
