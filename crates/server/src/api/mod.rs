// HTTP surface shared state and assembly.

pub mod comments;
pub mod meta;

use std::sync::Arc;

use axum::Router;

use crate::{
    auth::jwt::IdentityTokenService,
    cache::ListingCache,
    commit_hash::CommitHashGuard,
    error::{ErrorCode, ServerError},
    notify::CommentNotifier,
    store::{CommentStore, StoreError},
};

#[derive(Clone)]
pub struct AppState {
    pub store: CommentStore,
    pub commit_hash: CommitHashGuard,
    pub cache: ListingCache,
    pub token_service: Arc<IdentityTokenService>,
    pub admin_secret: String,
    pub github_client_id: String,
    pub notifier: Arc<dyn CommentNotifier>,
}

/// All document-comment routes: the public comment surface plus the
/// deploy-pipeline meta endpoints.
pub fn router(state: AppState) -> Router {
    Router::new().merge(comments::router(state.clone())).merge(meta::router(state))
}

/// Store failures surface as 401 rather than 404 so probing ids through
/// edit and delete reveals nothing about which comments exist.
pub(crate) fn map_store_error(error: StoreError) -> ServerError {
    match error {
        StoreError::NotFound => ServerError::from_code(ErrorCode::AuthNotOwner),
        StoreError::Internal(error) => {
            tracing::error!(error = ?error, "comment store failure");
            ServerError::from_code(ErrorCode::InternalError)
        }
    }
}
