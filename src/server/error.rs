//! HTTP mapping for domain errors.
//!
//! User-facing bodies are generic; the detailed message (which may
//! contain filesystem paths) only goes to the server log. Read-path
//! errors render as plain text, admin/ingest errors as JSON with a
//! machine-readable category so the caller can explain remediation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::Error;

/// Router-facing error.
#[derive(Debug)]
pub enum AppError {
    /// Unknown course, unresolved file, missing index (404).
    NotFound(String),

    /// Entitled-access denial with no purchase page to offer (403).
    Forbidden(String),

    /// Malformed admin request (422).
    BadRequest(String),

    /// Admin request conflicts with existing state, e.g. duplicate slug
    /// (409).
    Conflict(String),

    /// A typed ingestion/store error, categorized for the admin caller.
    Ingest(Error),

    /// Anything unexpected (500). Logged, never echoed.
    Internal(anyhow::Error),
}

/// JSON error body for admin endpoints.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code,
            message: message.into(),
        },
    };
    (status, Json(body)).into_response()
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(detail) => Self::NotFound(detail),
            Error::Forbidden(detail) => Self::Forbidden(detail),
            other => Self::Ingest(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Generic remediation message per ingest category. Never includes
/// paths or other internals.
fn ingest_message(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::InvalidArchive(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "The uploaded file is not a ZIP archive.",
        ),
        Error::ArchiveOpenFailure(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "The archive could not be opened; it may be corrupt.",
        ),
        Error::TraversalDetected(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "The archive contains entries with invalid paths.",
        ),
        Error::MisconfiguredCourse(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Select a product for this course before uploading content.",
        ),
        Error::StorageFailure(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Extraction failed; existing content is unchanged.",
        ),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "Course not found."),
        Error::Forbidden(_) => (StatusCode::FORBIDDEN, "Access denied."),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(detail) => {
                tracing::debug!(detail = %detail, "not found");
                (StatusCode::NOT_FOUND, "404 Not Found").into_response()
            }
            Self::Forbidden(detail) => {
                tracing::info!(detail = %detail, "access denied");
                (StatusCode::FORBIDDEN, "403 Forbidden").into_response()
            }
            Self::BadRequest(message) => {
                json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_request", message)
            }
            Self::Conflict(message) => json_error(StatusCode::CONFLICT, "conflict", message),
            Self::Ingest(err) => {
                let (status, message) = ingest_message(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "ingestion failed");
                } else {
                    tracing::info!(error = %err, "ingestion rejected");
                }
                json_error(status, err.category(), message)
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error").into_response()
            }
        }
    }
}
