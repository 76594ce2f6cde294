//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in `X-User-Id`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// User resolved from the gateway header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayUser {
    pub user_id: String,
}

impl GatewayUser {
    /// Read the identity header, ignoring blank values.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|user_id| Self {
                user_id: user_id.to_string(),
            })
    }
}

/// Axum extractor for the gateway user.
#[axum::async_trait]
impl FromRequestParts<AppState> for GatewayUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_identity() {
        let mut headers = HeaderMap::new();
        assert!(GatewayUser::from_headers(&headers).is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert!(GatewayUser::from_headers(&headers).is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("user-42"));
        assert_eq!(
            GatewayUser::from_headers(&headers).map(|u| u.user_id),
            Some("user-42".to_string())
        );
    }
}
