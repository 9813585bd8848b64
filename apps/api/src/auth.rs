use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::errors::AppError;
use crate::models::user::Identity;
use crate::state::AppState;

/// Boundary to the external identity provider: turns a session token into the
/// verified identity behind it. Unknown or expired tokens resolve to `None`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, AppError>;
}

/// The authenticated caller. Extracting it rejects the request with 401 when
/// there is no valid session.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &state.config.session_cookie)
            .ok_or(AppError::Unauthorized)?;
        let identity = state
            .identity
            .resolve_session(&token)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(AuthUser(identity))
    }
}

/// Reads the session token from `Authorization: Bearer …`, falling back to the
/// session cookie. Signed cookie values look like `<token>.<signature>`; only
/// the token part is returned.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.split('.').next().unwrap_or(value).to_string())
        .filter(|t| !t.is_empty())
}
