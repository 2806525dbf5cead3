// Deploy-pipeline and client-bootstrap endpoints.
//
// Routes:
//   PUT    /meta/commithash   — record the hash of the freshly deployed build
//   GET    /meta/github-app   — OAuth client id for the sign-in button
//   DELETE /cache             — drop every cached listing

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    api::{map_store_error, AppState},
    auth::admin::require_admin,
    error::{ErrorCode, ServerError},
    validation::ValidatedJson,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meta/commithash", put(put_commit_hash))
        .route("/meta/github-app", get(github_app))
        .route("/cache", delete(purge_cache))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PutCommitHashRequest {
    commit_hash: String,
}

async fn put_commit_hash(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<PutCommitHashRequest>,
) -> Result<Json<Value>, ServerError> {
    if payload.commit_hash.is_empty() {
        return Err(ServerError::new(
            ErrorCode::ValidationFailed,
            "commit_hash must not be empty",
        ));
    }

    require_admin(&headers, &state.admin_secret)?;

    state.commit_hash.set(&payload.commit_hash).await.map_err(map_store_error)?;
    tracing::info!(commit_hash = %payload.commit_hash, "advanced site commit hash");

    Ok(Json(json!({ "status": 200 })))
}

async fn github_app(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": 200,
        "data": { "client_id": state.github_client_id },
    }))
}

async fn purge_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ServerError> {
    require_admin(&headers, &state.admin_secret)?;

    let removed = state.cache.purge_all().await;
    tracing::info!(removed, "purged listing cache");

    Ok(Json(json!({ "status": 200 })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Method, Request, StatusCode},
        response::Response,
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        auth::jwt::IdentityTokenService,
        cache::ListingCache,
        commit_hash::CommitHashGuard,
        notify::LogNotifier,
        store::CommentStore,
    };

    use super::*;

    const TEST_SECRET: &str = "marginalia_test_secret_long_enough_for_hs256";
    const ADMIN_SECRET: &str = "deploy_pipeline_secret_of_sufficient_len";

    fn test_state() -> AppState {
        AppState {
            store: CommentStore::memory(),
            commit_hash: CommitHashGuard::memory(),
            cache: ListingCache::new(),
            token_service: Arc::new(
                IdentityTokenService::new(TEST_SECRET).expect("service should initialize"),
            ),
            admin_secret: ADMIN_SECRET.into(),
            github_client_id: "Iv1.test-client".into(),
            notifier: Arc::new(LogNotifier),
        }
    }

    fn test_app(state: AppState) -> Router {
        router(state)
    }

    fn put_hash_request(bearer: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::PUT)
            .uri("/meta/commithash")
            .header("content-type", "application/json");
        if let Some(bearer) = bearer {
            builder = builder.header(AUTHORIZATION, bearer);
        }
        builder.body(Body::from(body.to_string())).expect("request should build")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        serde_json::from_slice(&bytes).expect("response body should be JSON")
    }

    #[tokio::test]
    async fn admin_can_advance_the_commit_hash() {
        let state = test_state();
        let app = test_app(state.clone());

        let response = app
            .oneshot(put_hash_request(
                Some(&format!("Bearer {ADMIN_SECRET}")),
                json!({ "commit_hash": "4f2c9a1" }),
            ))
            .await
            .expect("request should complete");
        assert_eq!(response.status(), StatusCode::OK);

        assert!(state.commit_hash.matches("4f2c9a1").await.expect("guard should answer"));
    }

    #[tokio::test]
    async fn empty_commit_hash_is_rejected_before_auth() {
        let state = test_state();
        let app = test_app(state);

        // No admin header: the empty hash 400s first.
        let response = app
            .oneshot(put_hash_request(None, json!({ "commit_hash": "" })))
            .await
            .expect("request should complete");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_admin_cannot_set_the_commit_hash() {
        let state = test_state();
        let app = test_app(state.clone());

        let response = app
            .oneshot(put_hash_request(
                Some("Bearer wrong-secret"),
                json!({ "commit_hash": "4f2c9a1" }),
            ))
            .await
            .expect("request should complete");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!state.commit_hash.matches("4f2c9a1").await.expect("guard should answer"));
    }

    #[tokio::test]
    async fn github_app_exposes_the_client_id() {
        let app = test_app(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/meta/github-app")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should complete");
        assert_eq!(response.status(), StatusCode::OK);

        let parsed = body_json(response).await;
        assert_eq!(parsed["data"]["client_id"], "Iv1.test-client");
    }

    #[tokio::test]
    async fn admin_purge_empties_the_cache() {
        let state = test_state();
        state
            .cache
            .put("wiki.example.org", "/doc", axum::body::Bytes::from_static(b"[]"))
            .await;
        let app = test_app(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/cache")
                    .header(AUTHORIZATION, format!("Bearer {ADMIN_SECRET}"))
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should complete");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.cache.is_empty().await);
    }

    #[tokio::test]
    async fn non_admin_cannot_purge_the_cache() {
        let state = test_state();
        state
            .cache
            .put("wiki.example.org", "/doc", axum::body::Bytes::from_static(b"[]"))
            .await;
        let app = test_app(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/cache")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should complete");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.cache.len().await, 1);
    }
}
