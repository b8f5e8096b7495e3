//! HTTP surface: routing, middleware and server lifecycle.

use crate::{
    auth::{Authenticator, TokenIssuer},
    buckets::BucketService,
    store::DocumentStore,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post, put},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;
pub mod rate_limit;

pub use openapi::openapi;
pub use rate_limit::{RateLimiter, DEFAULT_RATE_LIMIT};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the handlers need, built once at startup.
#[derive(Clone, Debug)]
pub struct Services {
    pub authenticator: Arc<Authenticator>,
    pub buckets: Arc<BucketService>,
    pub tokens: Arc<TokenIssuer>,
    pub store: Arc<dyn DocumentStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl Services {
    /// Wire the core components around one store and one signing key.
    #[must_use]
    pub fn new(
        authenticator: Authenticator,
        buckets: BucketService,
        tokens: Arc<TokenIssuer>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            buckets: Arc::new(buckets),
            tokens,
            store,
            rate_limiter: Arc::new(rate_limit::NoopRateLimiter),
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}

/// Build the application router with all middleware applied.
pub fn router(services: &Services, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let api = Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/buckets", get(handlers::list_buckets))
        .route(
            "/buckets/:bucket",
            get(handlers::get_bucket).delete(handlers::delete_bucket),
        )
        .route(
            "/buckets/:bucket/:key",
            put(handlers::upsert_key).delete(handlers::delete_key),
        );

    Router::new()
        .route("/", get(handlers::root))
        .nest("/api/v1", api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CatchPanicLayer::custom(handlers::panic_response))
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    services.rate_limiter.clone(),
                    rate_limit::limit_by_ip,
                ))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(Extension(services.authenticator.clone()))
                .layer(Extension(services.buckets.clone()))
                .layer(Extension(services.tokens.clone())),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(Extension(services.store.clone()))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, services: Services, request_timeout: Duration) -> Result<()> {
    let app = router(&services, request_timeout);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
