//! Provider error types.

use reqwest::StatusCode;
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// No eligible provider, or the provider refused service
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected or aborted the generation
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Provider request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider job not found: {0}")]
    NotFound(String),

    #[error("Provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify a non-success HTTP reply.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited(body),
            StatusCode::NOT_FOUND => Self::NotFound(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unavailable(format!(
                "{}: {}",
                status, body
            )),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Self::GenerationFailed(format!("{}: {}", status, body))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Self::Timeout(body),
            _ => Self::Api {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::Timeout(_) | ProviderError::RateLimited(_) => {
                true
            }
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::BAD_REQUEST, "bad prompt".into()),
            ProviderError::GenerationFailed(_)
        ));
        assert!(ProviderError::from_status(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(!ProviderError::generation_failed("nope").is_retryable());
    }
}
