//! API error taxonomy and the uniform JSON error envelope.

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::identity::IdentityError;
use crate::inference::InferenceError;
use crate::throttle::ThrottleRejection;
use crate::upload::UploadRejection;

/// Generic caller-facing text for upstream failures. The real cause is logged.
pub const UPSTREAM_UNAVAILABLE: &str = "AI service temporarily unavailable";

/// Error envelope: `{success:false, error, message?, details?}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

/// One failed input check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Access token required")]
    Unauthenticated,
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),
    #[error("Invalid input")]
    InvalidInput(Vec<FieldError>),
    #[error("Throttled: {message}")]
    Throttled {
        retry_after: u64,
        message: &'static str,
    },
    #[error("Payload rejected: {0}")]
    PayloadRejected(String),
    #[error("{error}")]
    UpstreamUnavailable { error: &'static str, message: String },
    #[error("Route not found")]
    RouteNotFound,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::InvalidInput(vec![FieldError::new(field, message)])
    }

    /// Normalise an inference failure. The underlying cause goes to the
    /// operator log; the caller gets `error` plus a generic message.
    pub fn upstream(error: &'static str, cause: InferenceError) -> Self {
        tracing::warn!(cause = %cause, reply = error, "Inference call failed");
        ApiError::UpstreamUnavailable {
            error,
            message: UPSTREAM_UNAVAILABLE.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidInput(_) | ApiError::PayloadRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::UpstreamUnavailable { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            ApiError::Throttled { retry_after, .. } => Some(*retry_after),
            _ => None,
        };

        let body = match self {
            ApiError::Unauthenticated => ErrorBody::new("Access token required"),
            ApiError::Forbidden(reason) => ErrorBody::new(reason),
            ApiError::InvalidInput(details) => ErrorBody {
                details,
                ..ErrorBody::new("Invalid input")
            },
            ApiError::Throttled { message, .. } => ErrorBody::new(message),
            ApiError::PayloadRejected(reason) => ErrorBody::new(reason),
            ApiError::UpstreamUnavailable { error, message } => ErrorBody {
                message: Some(message),
                ..ErrorBody::new(error)
            },
            ApiError::RouteNotFound => ErrorBody::new("Route not found"),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                ErrorBody::new("An internal error occurred")
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = retry_after {
            if let Ok(val) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: None,
            details: Vec::new(),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unauthenticated => ApiError::Unauthenticated,
            IdentityError::Forbidden => ApiError::Forbidden("Invalid or expired token"),
            IdentityError::Signing(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<ThrottleRejection> for ApiError {
    fn from(rejection: ThrottleRejection) -> Self {
        ApiError::Throttled {
            retry_after: rejection.retry_after_secs,
            message: rejection.message,
        }
    }
}

impl From<UploadRejection> for ApiError {
    fn from(rejection: UploadRejection) -> Self {
        if rejection.is_payload_rejection() {
            ApiError::PayloadRejected(rejection.to_string())
        } else {
            ApiError::invalid(crate::upload::IMAGE_FIELD, rejection.to_string())
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConstraintViolation { field, message } => ApiError::invalid(field, message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid("body", rejection.body_text())
    }
}
