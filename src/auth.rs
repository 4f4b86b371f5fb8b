use axum::extract::{FromRef, FromRequestParts};
use axum::http::{request::Parts, HeaderMap};

use crate::constants::MIN_ADMIN_TOKEN_LEN;
use crate::response::AppError;
use crate::state::AppState;

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Byte comparison whose running time depends only on the lengths.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Caller presented the configured admin token.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let expected = app_state.config().admin_token.as_str();
        if expected.len() < MIN_ADMIN_TOKEN_LEN {
            return Err(AppError::forbidden("Admin API is disabled"));
        }

        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;
        if !tokens_match(&token, expected) {
            return Err(AppError::unauthorized("Invalid admin token"));
        }
        Ok(AdminAuth)
    }
}
