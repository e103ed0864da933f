use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use tracing::warn;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo_types::{Actor, UserRole};

/// Extracts and validates the bearer access token, returning the user ID.
pub struct AuthUser(pub Uuid);

/// Authenticated user with a registered profile.
pub struct ActingUser(pub Actor);

pub(crate) fn verify_access(cfg: &JwtConfig, token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::default();
    validation.set_audience(std::slice::from_ref(&cfg.audience));
    validation.set_issuer(std::slice::from_ref(&cfg.issuer));
    let decoding = DecodingKey::from_secret(cfg.secret.as_bytes());

    let data = decode::<Claims>(token, &decoding, &validation).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        ApiError::Unauthorized("invalid or expired token".into())
    })?;

    if data.claims.kind != TokenKind::Access {
        return Err(ApiError::Unauthorized("access token required".into()));
    }
    Ok(data.claims)
}

pub(crate) fn require_admin(actor: Actor) -> Result<(), ApiError> {
    if actor.role != UserRole::Admin {
        return Err(ApiError::Forbidden("admin only".into()));
    }
    Ok(())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("invalid auth scheme".into()))?;

        let claims = verify_access(&state.config.jwt, token)?;
        Ok(AuthUser(claims.sub))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ActingUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;
        let actor = state
            .identity
            .actor(user_id)
            .await?
            .ok_or_else(|| ApiError::Forbidden("profile not registered".into()))?;
        Ok(ActingUser(actor))
    }
}
