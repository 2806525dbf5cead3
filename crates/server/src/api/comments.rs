// Per-document comment endpoints.
//
// Routes:
//   POST   /comment/{path}          — create (commit-hash fenced)
//   GET    /comment/{path}          — list, read-through cached per origin
//   PATCH  /comment/{path}/id/{id}  — edit own comment body
//   DELETE /comment/{path}/id/{id}  — delete own comment
//   PATCH  /comment/{path}          — deploy pipeline: rename / shift anchors
//
// Mutations check in a fixed order: payload shape, commit hash, then the
// caller's token. A stale page learns it is stale even when its token has
// expired.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use marginalia_common::{
    anchor::{validate_edits, ContentEdit, OffsetSpan},
    path::PathId,
    types::Commenter,
};

use crate::{
    api::{map_store_error, AppState},
    auth::{admin::require_admin, middleware::authenticate_commenter},
    error::{ErrorCode, ServerError},
    notify::spawn_comment_created,
    store::NewComment,
    validation::{check_comment_body, check_offset_span, ValidatedJson},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/comment/{path}",
            get(list_comments).post(create_comment).patch(rewrite_path),
        )
        .route(
            "/comment/{path}/id/{id}",
            axum::routing::patch(update_comment).delete(delete_comment),
        )
        .with_state(state)
}

// ── Request bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PostCommentRequest {
    commit_hash: String,
    offset: OffsetSpan,
    comment: String,
}

#[derive(Debug, Deserialize)]
struct PatchCommentRequest {
    comment: String,
}

/// Deploy-pipeline rewrite of a whole document's comments.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RewriteRequest {
    Renamed { to: String },
    Modified { diff: Vec<ContentEdit> },
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn create_comment(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<PostCommentRequest>,
) -> Result<Json<Value>, ServerError> {
    let path = parse_document_path(&raw_path)?;
    check_offset_span(payload.offset)?;
    check_comment_body(&payload.comment)?;

    if !state.commit_hash.matches(&payload.commit_hash).await.map_err(map_store_error)? {
        return Err(ServerError::from_code(ErrorCode::CommitHashMismatch));
    }

    let identity = authenticate_commenter(&headers, &state.token_service)?;

    let created = state
        .store
        .create(NewComment {
            path: path.as_str().to_owned(),
            offset: payload.offset,
            commenter: identity.commenter,
            commenter_name: identity.display_name,
            comment: payload.comment,
        })
        .await
        .map_err(map_store_error)?;

    spawn_comment_created(state.notifier.clone(), created);
    spawn_purge(&state, path.as_str());

    Ok(ok_status())
}

async fn list_comments(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let path = parse_document_path(&raw_path)?;
    let origin = request_origin(&headers);

    if let Some(cached) = state.cache.get(&origin, path.as_str()).await {
        return Ok(json_response(cached));
    }

    let comments = state.store.list_by_path(path.as_str()).await.map_err(map_store_error)?;
    let body = serde_json::to_vec(&json!({ "status": 200, "data": comments }))
        .map_err(|_| ServerError::from_code(ErrorCode::InternalError))?;
    let body = axum::body::Bytes::from(body);

    // Populate off the request path; the reader gets the fresh body either way.
    {
        let cache = state.cache.clone();
        let path = path.as_str().to_owned();
        let body = body.clone();
        tokio::spawn(async move {
            cache.put(&origin, &path, body).await;
        });
    }

    Ok(json_response(body))
}

async fn update_comment(
    State(state): State<AppState>,
    Path((raw_path, id)): Path<(String, i64)>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<PatchCommentRequest>,
) -> Result<Json<Value>, ServerError> {
    let path = parse_document_path(&raw_path)?;
    check_comment_body(&payload.comment)?;

    let identity = authenticate_commenter(&headers, &state.token_service)?;
    require_ownership(&state, path.as_str(), id, &identity.commenter).await?;

    state.store.update_body(path.as_str(), id, &payload.comment).await.map_err(map_store_error)?;
    spawn_purge(&state, path.as_str());

    Ok(ok_status())
}

async fn delete_comment(
    State(state): State<AppState>,
    Path((raw_path, id)): Path<(String, i64)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ServerError> {
    let path = parse_document_path(&raw_path)?;

    let identity = authenticate_commenter(&headers, &state.token_service)?;
    require_ownership(&state, path.as_str(), id, &identity.commenter).await?;

    state.store.delete(path.as_str(), id).await.map_err(map_store_error)?;
    spawn_purge(&state, path.as_str());

    Ok(ok_status())
}

async fn rewrite_path(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<RewriteRequest>,
) -> Result<Json<Value>, ServerError> {
    let path = parse_document_path(&raw_path)?;

    match &payload {
        RewriteRequest::Renamed { to } => {
            parse_document_path(to)?;
        }
        RewriteRequest::Modified { diff } => {
            validate_edits(diff).map_err(|error| {
                ServerError::new(ErrorCode::ValidationFailed, error.to_string())
                    .with_details(json!({ "field": "diff" }))
            })?;
        }
    }

    require_admin(&headers, &state.admin_secret)?;

    match payload {
        RewriteRequest::Renamed { to } => {
            let moved = state.store.rename_path(path.as_str(), &to).await.map_err(map_store_error)?;
            tracing::info!(from = %path, %to, moved, "renamed comment path");
            spawn_purge(&state, &to);
        }
        RewriteRequest::Modified { diff } => {
            let changed =
                state.store.apply_edits(path.as_str(), &diff).await.map_err(map_store_error)?;
            tracing::info!(path = %path, edits = diff.len(), changed, "shifted comment anchors");
        }
    }

    spawn_purge(&state, path.as_str());
    Ok(ok_status())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn parse_document_path(raw: &str) -> Result<PathId, ServerError> {
    PathId::parse(raw).map_err(|error| {
        ServerError::new(ErrorCode::ValidationFailed, error.to_string())
            .with_details(json!({ "field": "path" }))
    })
}

/// The comment must exist on this path and belong to the caller. Both
/// failures collapse into the same 401.
async fn require_ownership(
    state: &AppState,
    path: &str,
    id: i64,
    caller: &Commenter,
) -> Result<(), ServerError> {
    let owner = state.store.get_owner(path, id).await.map_err(map_store_error)?;
    match owner {
        Some(owner) if owner == *caller => Ok(()),
        _ => Err(ServerError::from_code(ErrorCode::AuthNotOwner)),
    }
}

/// Cache origin key. The worker runs behind TLS termination, so the Host
/// header is the closest stand-in for the request origin.
fn request_origin(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_owned()
}

fn spawn_purge(state: &AppState, path: &str) {
    let cache = state.cache.clone();
    let path = path.to_owned();
    tokio::spawn(async move {
        cache.purge_path(&path).await;
    });
}

fn ok_status() -> Json<Value> {
    Json(json!({ "status": 200 }))
}

fn json_response(body: axum::body::Bytes) -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, "application/json")], Body::from(body)).into_response()
}
