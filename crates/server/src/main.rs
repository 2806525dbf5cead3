mod api;
mod auth;
mod cache;
mod commit_hash;
mod config;
mod cors;
mod db;
mod error;
mod notify;
mod store;
mod validation;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{
    api::AppState,
    auth::{
        jwt::IdentityTokenService,
        oauth::{OAuthState, StubGithubExchange},
    },
    cache::ListingCache,
    commit_hash::CommitHashGuard,
    config::ServerConfig,
    error::{
        attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
    },
    notify::LogNotifier,
    store::CommentStore,
};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;

    let (store, hash_guard) = match &config.database_url {
        Some(database_url) => {
            let pool = db::create_pg_pool(database_url, db::max_connections_from_env())
                .await
                .context("failed to create PostgreSQL pool")?;
            store::ensure_schema(&pool).await.context("failed to prepare database schema")?;
            db::check_pool_health(&pool).await?;
            (CommentStore::Postgres(pool.clone()), CommitHashGuard::Postgres(pool))
        }
        None => {
            info!("MARGINALIA_DATABASE_URL unset; using in-memory storage");
            (CommentStore::memory(), CommitHashGuard::memory())
        }
    };

    let token_service = Arc::new(
        IdentityTokenService::new(&config.jwt_secret).context("invalid identity token secret")?,
    );

    let state = AppState {
        store: store.clone(),
        commit_hash: hash_guard,
        cache: ListingCache::new(),
        token_service: token_service.clone(),
        admin_secret: config.admin_secret.clone(),
        github_client_id: config.github_client_id.clone(),
        notifier: Arc::new(LogNotifier),
    };

    let oauth_state = OAuthState {
        github_client_id: config.github_client_id.clone(),
        github_client_secret: config.github_client_secret.clone(),
        github_exchange: Arc::new(StubGithubExchange),
        token_service,
        store,
    };

    let app = build_router(state, oauth_state, config.cors_origins.clone());

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;

    info!(listen_addr = %config.bind_addr, "starting comment server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("comment server exited unexpectedly")
}

fn build_router(state: AppState, oauth_state: OAuthState, cors_origins: Option<String>) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(api::router(state))
            .merge(auth::oauth::router(oauth_state)),
        cors_origins,
    )
}

fn apply_middleware(router: Router, cors_origins: Option<String>) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(cors::cors_layer(cors_origins))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = std::time::Instant::now();

    let mut response =
        with_request_id_scope(request_id.clone(), async move { next.run(request).await }).await;

    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
