#![allow(clippy::needless_for_each)]

use super::handlers::{
    buckets::{
        self, __path_delete_bucket, __path_delete_key, __path_get_bucket, __path_list_buckets,
        __path_upsert_key,
    },
    health::{self, __path_health},
    login::{self, __path_login},
    ErrorBody,
};
use crate::store::Bucket;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(health, login, list_buckets, get_bucket, delete_bucket, upsert_key, delete_key),
    components(schemas(
        health::Health,
        login::Credentials,
        login::LoginResponse,
        buckets::BucketsResponse,
        buckets::BucketResponse,
        buckets::KeyResponse,
        buckets::KeyValue,
        Bucket,
        ErrorBody
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Combined login and registration"),
        (name = "buckets", description = "Per-user key-value buckets"),
        (name = "health", description = "Liveness and store status")
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
