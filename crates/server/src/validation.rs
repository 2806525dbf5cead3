// Input validation for comment payloads.
//
// - `ValidatedJson<T>` extractor: content-type check + serde + structured errors.
// - Field validators for comment bodies and offset spans.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use marginalia_common::{
    anchor::OffsetSpan,
    types::{comment_body_in_range, MAX_COMMENT_CHARS, MIN_COMMENT_CHARS},
};

use crate::error::{ErrorCode, ServerError};

// ── ValidatedJson extractor ────────────────────────────────────────

/// A JSON body extractor that returns structured `ServerError` on failure.
///
/// Use this instead of `axum::Json<T>` in handlers to get consistent
/// VALIDATION_FAILED error responses instead of plain-text Axum rejections.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                let (message, details) = classify_json_rejection(&rejection);
                Err(ServerError::new(ErrorCode::ValidationFailed, message)
                    .with_details(details)
                    .into_response())
            }
        }
    }
}

/// Classify a JSON rejection into a human-readable message and details object.
fn classify_json_rejection(rejection: &JsonRejection) -> (String, serde_json::Value) {
    match rejection {
        JsonRejection::JsonDataError(e) => (
            format!("invalid JSON payload: {e}"),
            serde_json::json!({ "kind": "data_error" }),
        ),
        JsonRejection::JsonSyntaxError(e) => (
            format!("malformed JSON: {e}"),
            serde_json::json!({ "kind": "syntax_error" }),
        ),
        JsonRejection::MissingJsonContentType(_) => (
            "expected Content-Type: application/json".to_string(),
            serde_json::json!({ "kind": "missing_content_type" }),
        ),
        JsonRejection::BytesRejection(e) => (
            format!("request body error: {e}"),
            serde_json::json!({ "kind": "body_error" }),
        ),
        other => (
            format!("request body error: {other}"),
            serde_json::json!({ "kind": "unknown" }),
        ),
    }
}

// ── Field validators ───────────────────────────────────────────────

/// Validate a comment body: length bounds are counted in characters so
/// multi-byte text gets the same budget as ASCII.
pub fn check_comment_body(body: &str) -> Result<(), ServerError> {
    if comment_body_in_range(body) {
        return Ok(());
    }
    Err(ServerError::new(
        ErrorCode::ValidationFailed,
        format!(
            "comment body must be between {MIN_COMMENT_CHARS} and {MAX_COMMENT_CHARS} characters"
        ),
    )
    .with_details(serde_json::json!({ "field": "comment" })))
}

/// Validate an anchor span: start must be strictly below end.
pub fn check_offset_span(span: OffsetSpan) -> Result<(), ServerError> {
    if span.is_valid() {
        return Ok(());
    }
    Err(ServerError::new(
        ErrorCode::ValidationFailed,
        format!("offset span must satisfy start < end, got [{}, {})", span.start, span.end),
    )
    .with_details(serde_json::json!({ "field": "offset" })))
}
