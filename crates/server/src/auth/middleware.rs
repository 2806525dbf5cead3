// Bearer-token authentication helpers.
//
// These run inside handlers rather than as a route layer: mutation
// endpoints validate the payload and check the commit hash before touching
// the Authorization header, so a stale page gets its 409 even when the
// token has expired.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::{
    auth::jwt::{CommenterIdentity, IdentityTokenService},
    error::{ErrorCode, ServerError},
};

/// Validate the bearer token on `headers` and return the commenter it
/// identifies.
pub fn authenticate_commenter(
    headers: &HeaderMap,
    token_service: &IdentityTokenService,
) -> Result<CommenterIdentity, ServerError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| ServerError::new(ErrorCode::AuthInvalidToken, "missing bearer token"))?;

    token_service
        .validate_identity_token(token)
        .map_err(|_| ServerError::new(ErrorCode::AuthInvalidToken, "invalid bearer token"))
}

pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}
