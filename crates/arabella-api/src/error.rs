//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use arabella_models::JobStatus;
use arabella_store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: u32, available: u32 },

    #[error("Template is not active")]
    TemplateNotActive,

    #[error("Template requires a premium subscription")]
    TemplatePremiumOnly,

    #[error("Job cannot be cancelled while {0}")]
    JobCannotBeCancelled(JobStatus),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] arabella_queue::QueueError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::TemplatePremiumOnly => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) | ApiError::TemplateNotActive => {
                StatusCode::BAD_REQUEST
            }
            ApiError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiError::JobCannotBeCancelled(_) => StatusCode::CONFLICT,
            ApiError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Store(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) | ApiError::Validation(_) => "INVALID_REQUEST",
            ApiError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            ApiError::TemplateNotActive => "TEMPLATE_NOT_ACTIVE",
            ApiError::TemplatePremiumOnly => "TEMPLATE_PREMIUM_ONLY",
            ApiError::JobCannotBeCancelled(_) => "JOB_CANNOT_BE_CANCELLED",
            ApiError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            ApiError::Internal(_) | ApiError::Store(_) | ApiError::Queue(_) => "INTERNAL_ERROR",
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_) | ApiError::Store(_) | ApiError::Queue(_)
        )
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => ApiError::NotFound(format!("{} {}", kind, id)),
            StoreError::InsufficientCredits { needed, available } => {
                ApiError::InsufficientCredits { needed, available }
            }
            StoreError::JobAlreadyTerminal(status) | StoreError::NotCancellable(status) => {
                ApiError::JobCannotBeCancelled(status)
            }
            other => ApiError::Store(other),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let error = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}
