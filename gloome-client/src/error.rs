//! Error types for gloome-client
//!
//! - [`RenderError`]: a result payload violates the contract between its sections
//! - [`ClientError`]: talking to the remote service failed
//! - [`ApiError`]: HTTP glue errors, mapped to JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::form::FormError;
use crate::job::JobError;

/// Rendering precondition failure
///
/// These indicate a malformed response, never a user mistake, and are
/// reported instead of drawing partial output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("attribute `{0}` is named in the sort list but missing from the record")]
    MissingAttribute(String),

    #[error("node `{0}` has no entry in the node annotations")]
    MissingNodeAnnotation(String),

    #[error("branch to `{0}` has no entry in the branch annotations")]
    MissingBranchAnnotation(String),

    #[error("node name `{0}` appears more than once in the tree")]
    DuplicateNodeName(String),

    #[error("size factor must be a positive number, got {0}")]
    InvalidSizeFactor(f64),

    #[error("record `{record}`: {source}")]
    InRecord {
        record: String,
        #[source]
        source: Box<RenderError>,
    },
}

impl RenderError {
    pub(crate) fn in_record(record: &str, source: RenderError) -> Self {
        RenderError::InRecord {
            record: record.to_string(),
            source: Box::new(source),
        }
    }
}

/// Remote service errors
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Request could not complete (connection, timeout, TLS)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Service answered with a non-success HTTP status
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Body did not match the expected shape
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::ParseError(err.to_string())
        } else {
            ClientError::NetworkError(err.to_string())
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a job is already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Remote service failure (502)
    #[error("Upstream error: {0}")]
    Upstream(#[from] ClientError),

    /// Internal error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Busy(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::UnknownControl(_) => ApiError::NotFound(err.to_string()),
            FormError::AlreadyRegistered => ApiError::Internal(err.to_string()),
            FormError::NotAToggle(_) | FormError::Invalid(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => msg,
            ApiError::Upstream(err) => err.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
