//! Error taxonomy shared by the authenticator and the bucket store.

use axum::http::StatusCode;

/// Classification of every failure the core can report.
///
/// `BadRequest`, `Unauthorized` and `Forbidden` are expected outcomes triggered
/// by the caller and are not logged as faults. `Conflict` and `ServerFault` are
/// logged and reported to the caller with a generic message only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    Conflict,
    ServerFault,
}

impl ErrorKind {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::ServerFault => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure points at infrastructure rather than the caller.
    #[must_use]
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::Conflict | Self::ServerFault)
    }
}
