use axum::http::StatusCode;

// axum handler for /
pub async fn root() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}
