// Admin authentication for deploy-pipeline endpoints.
//
// The pipeline authenticates with a single shared secret in the bearer
// slot. Comparison goes through SHA-256 digests so the match does not leak
// prefix length through timing.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use sha2::{Digest, Sha256};

use crate::{
    auth::middleware::extract_bearer_token,
    error::{ErrorCode, ServerError},
};

/// Require the admin shared secret on `headers`.
pub fn require_admin(headers: &HeaderMap, admin_secret: &str) -> Result<(), ServerError> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| ServerError::new(ErrorCode::AuthInvalidToken, "missing admin token"))?;

    if digest(presented) != digest(admin_secret) {
        return Err(ServerError::new(ErrorCode::AuthInvalidToken, "invalid admin token"));
    }
    Ok(())
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}
