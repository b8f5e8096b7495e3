use super::{require_identity, ApiError, ErrorBody};
use crate::{auth::TokenIssuer, buckets::BucketService, store::Bucket};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BucketsResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    buckets: Vec<Bucket>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BucketResponse {
    bucket: Bucket,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct KeyResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    value: String,
    bucket: Bucket,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct KeyValue {
    value: String,
}

#[utoipa::path(
    get,
    path= "/api/v1/buckets",
    responses (
        (status = 200, description = "Buckets owned by the caller", body = BucketsResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag= "buckets"
)]
#[instrument(skip(headers, tokens, service))]
pub async fn list_buckets(
    headers: HeaderMap,
    tokens: Extension<Arc<TokenIssuer>>,
    service: Extension<Arc<BucketService>>,
) -> Result<Json<BucketsResponse>, ApiError> {
    let claims = require_identity(&headers, &tokens)?;
    let buckets = service.list_buckets(&claims).await?;

    Ok(Json(BucketsResponse { buckets }))
}

#[utoipa::path(
    get,
    path= "/api/v1/buckets/{bucket}",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses (
        (status = 200, description = "The bucket, or an empty object if it does not exist", body = BucketResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag= "buckets"
)]
#[instrument(skip(headers, tokens, service))]
pub async fn get_bucket(
    headers: HeaderMap,
    tokens: Extension<Arc<TokenIssuer>>,
    service: Extension<Arc<BucketService>>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketResponse>, ApiError> {
    let claims = require_identity(&headers, &tokens)?;
    let bucket = service.get_bucket(&claims, &bucket).await?;

    Ok(Json(BucketResponse { bucket }))
}

#[utoipa::path(
    delete,
    path= "/api/v1/buckets/{bucket}",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses (
        (status = 200, description = "Bucket deleted (or never existed)", body = BucketResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag= "buckets"
)]
#[instrument(skip(headers, tokens, service))]
pub async fn delete_bucket(
    headers: HeaderMap,
    tokens: Extension<Arc<TokenIssuer>>,
    service: Extension<Arc<BucketService>>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketResponse>, ApiError> {
    let claims = require_identity(&headers, &tokens)?;
    let bucket = service.delete_bucket(&claims, &bucket).await?;

    Ok(Json(BucketResponse { bucket }))
}

#[utoipa::path(
    put,
    path= "/api/v1/buckets/{bucket}/{key}",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Key within the bucket"),
    ),
    request_body = KeyValue,
    responses (
        (status = 201, description = "Key written, bucket created if needed", body = KeyResponse),
        (status = 400, description = "Missing or invalid body", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 409, description = "The key could not be written", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag= "buckets"
)]
#[instrument(skip(headers, tokens, service, payload))]
pub async fn upsert_key(
    headers: HeaderMap,
    tokens: Extension<Arc<TokenIssuer>>,
    service: Extension<Arc<BucketService>>,
    Path((bucket, key)): Path<(String, String)>,
    payload: Option<Json<KeyValue>>,
) -> Result<(StatusCode, Json<KeyResponse>), ApiError> {
    let claims = require_identity(&headers, &tokens)?;

    let Some(Json(KeyValue { value })) = payload else {
        debug!("Missing or invalid upsert payload");
        return Err(ApiError::bad_request("invalid request body"));
    };

    let write = service.upsert_key(&claims, &bucket, &key, &value).await?;

    Ok((
        StatusCode::CREATED,
        Json(KeyResponse {
            key: write.key,
            value: write.value,
            bucket: write.bucket,
        }),
    ))
}

#[utoipa::path(
    delete,
    path= "/api/v1/buckets/{bucket}/{key}",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Key within the bucket"),
    ),
    responses (
        (status = 200, description = "Key removed (or was never set)", body = KeyResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag= "buckets"
)]
#[instrument(skip(headers, tokens, service))]
pub async fn delete_key(
    headers: HeaderMap,
    tokens: Extension<Arc<TokenIssuer>>,
    service: Extension<Arc<BucketService>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<KeyResponse>, ApiError> {
    let claims = require_identity(&headers, &tokens)?;
    let removal = service.delete_key(&claims, &bucket, &key).await?;

    Ok(Json(KeyResponse {
        key: removal.key,
        value: String::new(),
        bucket: removal.bucket,
    }))
}
