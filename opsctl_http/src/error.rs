//! Error types for the admin HTTP surface

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opsctl_core::{ErrorKind, OverrideError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP server error: {0}")]
    HttpServer(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// An admin request that could not be honoured.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing query parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("query parameter '{name}' has invalid value '{value}'")]
    InvalidParameter { name: &'static str, value: String },

    #[error("logger '{0}' has no active override")]
    NotModified(String),

    #[error(transparent)]
    Override(#[from] OverrideError),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingParameter(_) | ApiError::InvalidParameter { .. } => {
                (StatusCode::BAD_REQUEST, "validation")
            }
            ApiError::NotModified(_) => (StatusCode::BAD_REQUEST, "not-modified"),
            ApiError::Override(e) => match e.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not-found"),
                ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            ApiError::MissingParameter(_) => "missing parameter",
            ApiError::InvalidParameter { .. } => "invalid parameter",
            ApiError::NotModified(_) => "not modified",
            ApiError::Override(OverrideError::InvalidDuration { .. }) => "invalid duration",
            ApiError::Override(OverrideError::UnknownLevel(_)) => "unknown level",
            ApiError::Override(OverrideError::BaselineNoOp { .. }) => "override to baseline",
            ApiError::Override(OverrideError::LoggerNotFound(_)) => "logger not found",
            ApiError::Override(OverrideError::Registry(_)) => "registry failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            error!("Admin request failed: {}", self);
        }
        let body = json!({
            "error": self.summary(),
            "kind": kind,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
