//! Application error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Every configured rate source failed during a refresh
    #[error("All rate sources unavailable: {0}")]
    AllSourcesUnavailable(String),

    /// Store or cache could not answer in time, or holds no data yet
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown purity: {0}")]
    UnknownPurity(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No making-charge rule found: {0}")]
    RuleNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::UnknownPurity(_) => StatusCode::BAD_REQUEST,
            AppError::RuleNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AllSourcesUnavailable(_) | AppError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Serializable error response for API clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let code = match err {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Http(_) => "HTTP_ERROR",
            AppError::AllSourcesUnavailable(_) => "ALL_SOURCES_UNAVAILABLE",
            AppError::Unavailable(_) => "UNAVAILABLE",
            AppError::UnknownPurity(_) => "UNKNOWN_PURITY",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::RuleNotFound(_) => "RULE_NOT_FOUND",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::RateLimited(_) => "RATE_LIMITED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
        };

        ErrorResponse {
            status: "error".to_string(),
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
