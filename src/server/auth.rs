/// Bearer tokens and error bodies.
///
/// Sessions are issued by the host application; this service only checks
/// the HS256 signature and expiry and reads the caller id from `sub`.
use axum::http::StatusCode;
use axum::Json;
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::error::AnchorError;

/// JWT claims for session tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Caller ID.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: usize,
    /// Issued at (Unix timestamp).
    pub iat: usize,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn reject(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a service error to its HTTP status. Internal details are logged, not returned.
pub fn error_response(e: AnchorError) -> ApiError {
    match e {
        AnchorError::NotFound(_) => reject(StatusCode::NOT_FOUND, e.to_string()),
        AnchorError::PreconditionFailed(_) | AnchorError::InvalidInput(_) => {
            reject(StatusCode::BAD_REQUEST, e.to_string())
        }
        AnchorError::Forbidden => reject(StatusCode::FORBIDDEN, e.to_string()),
        other => {
            error!(error = %other, "Request failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Issue a token for `caller`, valid for `ttl`. Used by tooling and tests.
pub fn issue_token(caller: Uuid, secret: &str, ttl: TimeDelta) -> Result<String, AnchorError> {
    let now = Utc::now();
    let claims = Claims {
        sub: caller.to_string(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AnchorError::Serialization(format!("JWT encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            error_response(AnchorError::NotFound("x".into())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_response(AnchorError::PreconditionFailed("x".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(error_response(AnchorError::Forbidden).0, StatusCode::FORBIDDEN);

        let (status, Json(body)) = error_response(AnchorError::Storage("password=hunter2".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.error.contains("hunter2"));
    }
}
