/// JWT-based request authentication.
///
/// Extracts and validates the bearer token from the Authorization header
/// and exposes the caller id to handlers through Axum's extractor pattern.
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use jsonwebtoken::{decode, DecodingKey, Validation};
use uuid::Uuid;

use super::auth::{error_response, reject, ApiError, Claims};
use super::AppState;
use crate::error::AnchorError;

/// Authenticated caller extracted from JWT.
///
/// ```ignore
/// async fn handler(user: AuthUser) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl AuthUser {
    /// Fail with 403 unless the caller may access `subject_ref`.
    pub async fn authorize(&self, state: &AppState, subject_ref: Option<Uuid>) -> Result<(), ApiError> {
        let Some(subject_ref) = subject_ref else {
            return Ok(());
        };

        let allowed = state
            .access
            .can_access(subject_ref, self.user_id)
            .await
            .map_err(error_response)?;

        if allowed {
            Ok(())
        } else {
            Err(error_response(AnchorError::Forbidden))
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Invalid Authorization format"))?;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| reject(StatusCode::UNAUTHORIZED, format!("Invalid token: {e}")))?;

        let user_id = Uuid::parse_str(&token_data.claims.sub)
            .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid user ID in token"))?;

        Ok(AuthUser { user_id })
    }
}
