//! Bearer tokens and the [`CurrentUser`] extractor.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use rand::RngCore;
use store::models::{Session, User};
use store::{Action, Resource, StoreError};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Random bytes per token, hex encoded on the wire.
const TOKEN_BYTES: usize = 32;

/// Generate a fresh opaque token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Create and persist a session for `user`, sweeping out expired ones first.
pub async fn issue_session(state: &AppState, user: &User) -> ApiResult<Session> {
    let now = Utc::now();
    let swept = state.store.delete_expired_sessions(now).await?;
    if swept > 0 {
        tracing::debug!("Removed {} expired sessions", swept);
    }
    let session = Session {
        token: generate_token(),
        user_id: user.id,
        expires_at: now + state.session_ttl,
    };
    state.store.create_session(session.clone()).await?;
    tracing::info!("Issued session for user {}", user.username);
    Ok(session)
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// The authenticated user behind a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl CurrentUser {
    /// Fail with 403 unless the user's flags allow `action` on `resource`.
    pub fn require(&self, resource: Resource, action: Action) -> ApiResult<()> {
        if self.user.permissions.allows(resource, action) {
            return Ok(());
        }
        tracing::warn!(
            "User {} denied {} on {}",
            self.user.username,
            action,
            resource
        );
        Err(ApiError::Forbidden(format!(
            "You do not have permission to {} {}",
            action, resource
        )))
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?
            .to_string();

        let session = state
            .store
            .find_session(&token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

        if session.is_expired(Utc::now()) {
            state.store.delete_session(&token).await?;
            return Err(ApiError::unauthorized("Invalid or expired token"));
        }

        let user = match state.store.get_user(session.user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                return Err(ApiError::unauthorized("Invalid or expired token"))
            }
            Err(e) => return Err(e.into()),
        };

        if !user.is_active {
            return Err(ApiError::unauthorized("Account is disabled"));
        }

        Ok(CurrentUser { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_generate_token() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer   abc123 "));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
