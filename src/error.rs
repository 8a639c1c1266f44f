//! Unified error model for the simulated Drive API.
//! Every validation failure maps to exactly one HTTP status, and the two
//! failure modes real clients must distinguish (lost permission, quota
//! exhaustion) carry the structured JSON bodies the live service emits.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriveError {
    /// Missing/stale bearer token or a failed OAuth2 parameter check.
    #[error("unauthorized")]
    Unauthorized,
    /// Unknown item or parent id.
    #[error("not found")]
    NotFound,
    /// Item is on the permission blocklist; distinct from NotFound.
    #[error("permission denied")]
    Forbidden,
    /// Malformed query shape, upload headers/ranges, or protocol-sequence violation.
    #[error("bad request")]
    BadRequest,
    /// Declared upload size would exceed the configured available space.
    #[error("storage quota exceeded")]
    QuotaExceeded,
}

impl DriveError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            DriveError::Unauthorized => StatusCode::UNAUTHORIZED,
            DriveError::NotFound => StatusCode::NOT_FOUND,
            DriveError::Forbidden => StatusCode::FORBIDDEN,
            DriveError::BadRequest => StatusCode::BAD_REQUEST,
            DriveError::QuotaExceeded => StatusCode::BAD_REQUEST,
        }
    }

    /// The `reason` string carried in the structured error body, when the
    /// real service sends one for this error kind.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            DriveError::Forbidden => Some("forbidden"),
            DriveError::QuotaExceeded => Some("storageQuotaExceeded"),
            _ => None,
        }
    }
}

impl IntoResponse for DriveError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        match self.reason() {
            Some(reason) => {
                // {"error": {"errors": [{"reason": ...}]}} is the shape Drive
                // uses for both forbidden and quota responses.
                let body = json!({"error": {"errors": [{"reason": reason}]}});
                (status, Json(body)).into_response()
            }
            None => status.into_response(),
        }
    }
}

pub type DriveResult<T> = Result<T, DriveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(DriveError::Unauthorized.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(DriveError::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(DriveError::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(DriveError::BadRequest.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(DriveError::QuotaExceeded.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn structured_reasons() {
        assert_eq!(DriveError::Forbidden.reason(), Some("forbidden"));
        assert_eq!(DriveError::QuotaExceeded.reason(), Some("storageQuotaExceeded"));
        assert_eq!(DriveError::Unauthorized.reason(), None);
        assert_eq!(DriveError::NotFound.reason(), None);
        assert_eq!(DriveError::BadRequest.reason(), None);
    }
}
