//! Error taxonomy shared by the content service and the HTTP layer.
//!
//! Library code returns [`WikiError`] values carrying the failing operation
//! and path; handlers map each kind onto an HTTP status and a
//! `{"error": "..."}` JSON body via the [`IntoResponse`] impl. Stack traces
//! never reach the client.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the content service, renderer, and search adapter.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("path {0} is a directory")]
    IsDirectory(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidPayload(String),

    #[error("tree not initialized")]
    Uninitialized,

    #[error("search not configured")]
    SearchUnavailable,

    #[error("{op} {}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Internal(String),
}

impl WikiError {
    /// Wrap an I/O failure with the operation name and the path it touched.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPath(_) | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::IsDirectory(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::SearchUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Uninitialized | Self::Io { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WikiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // I/O details stay in the log; the client sees a stable message.
        let message = match &self {
            WikiError::Io { op, path, .. } => format!("{op} {} failed", path.display()),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
