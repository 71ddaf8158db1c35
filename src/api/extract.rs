//! Bearer-token extractors.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::{ApiError, ApiState};
use crate::auth::Authenticated;

pub const MISSING_AUTH_HEADER: &str = "Missing or invalid authorization header";

/// The raw token from `Authorization: Bearer <token>`, not validated.
pub struct BearerToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized(MISSING_AUTH_HEADER.to_string()))?;
        Ok(Self(token.to_string()))
    }
}

/// A request carrying a valid, unexpired session.
pub struct SessionUser(pub Authenticated);

impl FromRequestParts<ApiState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let authenticated = state.auth.validate_session(&token).await?;
        Ok(Self(authenticated))
    }
}
