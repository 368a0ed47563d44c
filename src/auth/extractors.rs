use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{Role, User},
    },
    error::ApiError,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "jwt";

/// The authenticated caller, fully resolved. Extraction runs the whole
/// pipeline: token → signature/expiry → identity load → active → staleness.
pub struct CurrentUser(pub User);

/// Bearer header wins; the session cookie is the fallback transport.
pub(crate) fn bearer_or_cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
        .or_else(|| {
            CookieJar::from_headers(headers)
                .get(SESSION_COOKIE)
                .map(|c| c.value().to_owned())
        })
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_or_cookie_token(&parts.headers).ok_or(ApiError::Unauthenticated(
            "You are not logged in. Please log in to get access",
        ))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::Unauthenticated("Invalid or expired token")
        })?;

        // Inactive accounts are treated exactly like deleted ones.
        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .filter(|u| u.active)
            .ok_or(ApiError::Unauthenticated(
                "The user belonging to this token no longer exists",
            ))?;

        if user.changed_password_after(claims.iat) {
            warn!(user_id = %user.id, "stale token after password change");
            return Err(ApiError::Unauthenticated(
                "User recently changed password. Please log in again",
            ));
        }

        Ok(CurrentUser(user))
    }
}

/// Role gate, composed explicitly per protected operation.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = user.role.as_str(), "role check failed");
        Err(ApiError::Forbidden)
    }
}
