//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<_, AppError>`; the payload is always
//! `{type, description}` with `type` drawn from the closed set the API
//! documents.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{Error, ErrorKind};

/// Wire-level error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    NotFound,
    MissingCapability,
    UnknownFormat,
    InternalError,
    BadRequest,
}

/// The JSON error payload.
#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub description: String,
}

/// An API handler error.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    payload: ErrorPayload,
}

impl AppError {
    pub fn new(status: StatusCode, error_type: ErrorType, description: impl Into<String>) -> Self {
        Self {
            status,
            payload: ErrorPayload {
                error_type,
                description: description.into(),
            },
        }
    }

    /// A 404 payload for a missing entity.
    pub fn not_found(entity: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ErrorType::NotFound,
            format!("{entity} not found"),
        )
    }

    /// A 400 payload for a format name the registry does not know.
    pub fn unknown_format(name: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorType::UnknownFormat,
            format!("unknown format {name}"),
        )
    }

    /// A 403 payload for an operation the repository is not capable of.
    pub fn missing_capability(capability: &str) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            ErrorType::MissingCapability,
            format!("repository is missing the {capability} capability"),
        )
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        let (status, error_type) = match e.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, ErrorType::NotFound),
            ErrorKind::MissingCapability => (StatusCode::FORBIDDEN, ErrorType::MissingCapability),
            ErrorKind::UnknownFormat => (StatusCode::BAD_REQUEST, ErrorType::UnknownFormat),
            ErrorKind::BadRequest => (StatusCode::BAD_REQUEST, ErrorType::BadRequest),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, ErrorType::InternalError),
        };

        Self::new(status, error_type, e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                error = %self.payload.description,
                "server error in API handler"
            );
        }

        (self.status, Json(self.payload)).into_response()
    }
}
