//! Unified error taxonomy (spec.md §7) with the error envelope (spec.md §6).
//!
//! One `thiserror` variant per taxonomy entry rather than a generic
//! `{status, code, message}` struct: the taxonomy here is fixed and
//! exhaustive, so a closed enum lets the compiler check every call site
//! handles every case instead of trusting a free-form status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthError(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    InsufficientBalance(String),
    #[error("{0}")]
    UpstreamError(String),
    #[error("{0}")]
    Cancelled(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InsufficientBalance(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Cancelled(_) => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            AppError::UpstreamError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code in the error envelope. Matches spec.md §6's
    /// status-code list, not the HTTP status itself, since `Cancelled`
    /// has no clean standard status.
    pub fn code(&self) -> u16 {
        self.status().as_u16()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    code: u16,
    request_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// Renders the spec.md §6 error envelope. `request_id` should be threaded
/// through from the request's generated id when available; callers without
/// one (errors raised before a request id exists) pass `"unknown"`.
pub fn envelope(err: &AppError, request_id: &str) -> Response {
    let status = err.status();
    let body = ErrorEnvelope {
        error: ErrorBody {
            message: err.to_string(),
            kind: "api_error",
            code: status.as_u16(),
            request_id: request_id.to_string(),
        },
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        envelope(&self, "unknown")
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// `GET /v1/models/{id}` returns a plain 404 for an unknown id (spec.md §6)
/// rather than routing through the fixed `AppError` taxonomy, which has no
/// "not found" variant of its own (design notes §9).
pub fn not_found(message: &str, request_id: &str) -> Response {
    let body = ErrorEnvelope {
        error: ErrorBody {
            message: message.to_string(),
            kind: "api_error",
            code: StatusCode::NOT_FOUND.as_u16(),
            request_id: request_id.to_string(),
        },
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
