//! Application error type and its HTTP / tool-envelope projections.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Behavioral error categories, per the collector's error-handling design.
///
/// These are not 1:1 with HTTP status codes: `RateLimited` in the sync path is
/// a clean stop condition, not a failure, and never reaches this type; it
/// only shows up here if a tool handler surfaces it directly.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("AuthExpired: {0}")]
    AuthExpired(String),

    #[error("RateLimited: {0}")]
    RateLimited(String),

    #[error("TransientUpstream: {0}")]
    TransientUpstream(String),

    #[error("CorruptCredential: {0}")]
    CorruptCredential(String),

    #[error("UnrecognizedFormat: {0}")]
    UnrecognizedFormat(String),

    #[error("RecordCapExceeded: {0}")]
    RecordCapExceeded(String),

    #[error("ArchiveTooLarge: {0}")]
    ArchiveTooLarge(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error("NotFound: {0}")]
    NotFound(String),

    #[error("Internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthExpired(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::TransientUpstream(_) => StatusCode::BAD_GATEWAY,
            AppError::ArchiveTooLarge(_)
            | AppError::UnrecognizedFormat(_)
            | AppError::RecordCapExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::CorruptCredential(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The `"<ErrorKind>: <detail>"` string carried by the tool-dispatch envelope.
    ///
    /// This is also what `Display` produces; kept as a named method because
    /// handlers build the envelope explicitly rather than relying on `ToString`.
    pub fn envelope_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::Internal(_) | AppError::CorruptCredential(_) => {
                tracing::error!(error = %self, "internal error");
            }
            AppError::TransientUpstream(_) | AppError::RateLimited(_) => {
                tracing::warn!(error = %self, "upstream error");
            }
            _ => {
                tracing::info!(error = %self, "client error");
            }
        }

        let body = ErrorResponse {
            error: self.envelope_message(),
            detail: self.to_string(),
        };
        (status, Json(json!(body))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(format!("database error: {err}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
