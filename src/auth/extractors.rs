use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use super::claims::SessionClaims;
use crate::{error::AppError, state::AppState};

/// Verified session claims of the caller.
pub struct AuthUser(pub SessionClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims = state.auth.sessions().verify(token.trim()).map_err(|e| {
            warn!(error = %e, "rejected session credential");
            AppError::Unauthorized
        })?;

        Ok(AuthUser(claims))
    }
}
