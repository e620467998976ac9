//! Top-level error type shared across HTTP handlers.
//!
//! Each subsystem defines its own `thiserror` enum at its boundary; this module
//! folds them into one type the HTTP layer can turn into a response, mirroring
//! the per-module error enums in the orchestrator core this crate was grown
//! from (`HealthError`, `MetricsError`, `LeaseError`) rather than a single
//! ad-hoc `anyhow::Error` at the edge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("license denied: {0}")]
    LicenseDenied(String),

    #[error("agent unauthenticated")]
    AgentUnauthenticated,

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::LicenseDenied(_) => StatusCode::FORBIDDEN,
            AppError::AgentUnauthenticated => StatusCode::UNAUTHORIZED,
            AppError::DependencyUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> String {
        match self {
            AppError::Validation(r)
            | AppError::NotFound(r)
            | AppError::Conflict(r)
            | AppError::LicenseDenied(r)
            | AppError::DependencyUnavailable(r)
            | AppError::Internal(r) => r.clone(),
            AppError::AgentUnauthenticated => "invalid or missing bearer token".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    reason: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::error!(error = %self, "request failed with internal error");
        } else {
            tracing::warn!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("error"),
            reason: self.reason(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("record not found".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
