use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tracing::error;

use crate::repository::RepositoryError;
use crate::validation::ValidationError;

pub type AppResult<T> = Result<T, AppError>;

/// Stable identifiers surfaced to clients; never change an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    InvalidState,
    ConversionFailure,
    ProcessingTimeout,
    StorageFailure,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::ConversionFailure => "CONVERSION_FAILURE",
            ErrorCode::ProcessingTimeout => "PROCESSING_TIMEOUT",
            ErrorCode::StorageFailure => "STORAGE_FAILURE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "VALIDATION_ERROR" => Some(ErrorCode::ValidationError),
            "NOT_FOUND" => Some(ErrorCode::NotFound),
            "INVALID_STATE" => Some(ErrorCode::InvalidState),
            "CONVERSION_FAILURE" => Some(ErrorCode::ConversionFailure),
            "PROCESSING_TIMEOUT" => Some(ErrorCode::ProcessingTimeout),
            "STORAGE_FAILURE" => Some(ErrorCode::StorageFailure),
            _ => None,
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidState => StatusCode::CONFLICT,
            ErrorCode::ConversionFailure => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ProcessingTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::StorageFailure => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const STORAGE_FAILURE_MESSAGE: &str = "Storage service error - please try again later.";

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status(),
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found() -> Self {
        Self::new(
            ErrorCode::NotFound,
            "Document not found - it may have been removed. Upload the file again to process it.",
        )
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    /// Logs the technical cause and hides it behind a generic retry message.
    pub fn storage<E: Display>(error: E) -> Self {
        error!(error = %error, "storage operation failed");
        Self::new(ErrorCode::StorageFailure, STORAGE_FAILURE_MESSAGE)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.code,
            message: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorCode,
    message: String,
}

impl From<ValidationError> for AppError {
    fn from(value: ValidationError) -> Self {
        AppError::validation(value.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        AppError::storage(value)
    }
}
