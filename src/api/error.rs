use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::analytics::{IngestError, ReportError};

/// Error body returned to API consumers
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Status code plus body; handlers return this directly
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.body.details = Some(details.into());
        self
    }

    /// 400 Bad Request
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// 404 Not Found
    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    /// 405 Method Not Allowed
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    /// 500 for a backend that never came up
    pub fn backend_unavailable() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed")
            .with_details("Storage backend is not configured")
    }

    /// 500 for a backend that failed while serving. Never carries the cause.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
        } else {
            ApiError::bad_request("Invalid event data format")
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::EmptyBody => ApiError::bad_request("Request body is required"),
            IngestError::Invalid(reason) => {
                tracing::debug!("Rejected analytics event: {}", reason);
                ApiError::bad_request("Invalid event data format")
            }
            IngestError::Storage(e) => {
                tracing::error!("Failed to record analytics event: {:#}", e);
                ApiError::internal()
            }
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::UserNotFound => ApiError::not_found("User not found"),
            ReportError::InvalidWindow(_) => {
                ApiError::bad_request("Parameter days must be a positive number of days")
            }
            ReportError::Storage(e) => {
                tracing::error!("Failed to build analytics report: {:#}", e);
                ApiError::internal()
            }
        }
    }
}
