//! Error types for the HTTP API.
//!
//! [`ApiError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.
//!
//! | Variant | Status |
//! |---------|--------|
//! | `Version(Validation)` | 422 |
//! | `Version(NotFound)`, `NotFound`, unknown policy parameter | 404 |
//! | `Version(Conflict)` | 409 |
//! | `Version(Persistence)` | 503 |
//! | `BadRequest` | 400 |

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vigil_core::{PolicyError, VersionError};

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A versioned-record operation failed.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was malformed: missing header, bad JSON, bad query.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Version(VersionError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Version(VersionError::NotFound { .. }) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Version(VersionError::Conflict { .. }) => StatusCode::CONFLICT,
            Self::Version(VersionError::Persistence(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(error: PolicyError) -> Self {
        match error {
            PolicyError::UnknownParameter { .. } => Self::NotFound(error.to_string()),
            PolicyError::Version(e) => Self::Version(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Version(VersionError::Persistence(detail)) => {
                tracing::error!(error = %detail, "Storage failure while serving request");
            }
            Self::Version(VersionError::Conflict { .. }) => {
                tracing::warn!(error = %self, "Request lost a version race");
            }
            _ => {}
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
