// GitHub OAuth sign-in for commenters.
//
// The static wiki sends readers to GitHub's authorize page with a `state`
// carrying the page to return to. GitHub redirects back here; we exchange
// the code, record the user, mint an identity token and bounce the browser
// back to the wiki with `?oauth_token=<jwt>` appended.

use std::{future::Future, pin::Pin, sync::Arc};

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use url::Url;

use marginalia_common::types::Commenter;

use crate::{
    auth::jwt::{CommenterIdentity, IdentityTokenService},
    error::{ErrorCode, ServerError},
    store::CommentStore,
};

pub const GITHUB_PROVIDER: &str = "github";

/// Token returned by GitHub after code exchange.
#[derive(Debug, Clone)]
pub struct GithubTokenResponse {
    pub access_token: String,
}

/// GitHub profile fields we keep.
#[derive(Debug, Clone)]
pub struct GithubUserInfo {
    pub user_id: String,
    pub display_name: String,
}

/// Trait for GitHub OAuth API calls (exchanging codes, fetching profiles).
/// Using boxed futures for object safety / dynamic dispatch in tests.
pub trait GithubExchange: Send + Sync {
    fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GithubTokenResponse, ServerError>> + Send>>;

    fn get_user_info(
        &self,
        access_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GithubUserInfo, ServerError>> + Send>>;
}

/// Stub exchange that always fails. Used when the server is constructed
/// without a real GitHub client, e.g. in listing-only test setups.
pub struct StubGithubExchange;

impl GithubExchange for StubGithubExchange {
    fn exchange_code(
        &self,
        _code: &str,
        _client_id: &str,
        _client_secret: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GithubTokenResponse, ServerError>> + Send>> {
        Box::pin(async { Err(ServerError::from_code(ErrorCode::AuthCodeInvalid)) })
    }

    fn get_user_info(
        &self,
        _access_token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GithubUserInfo, ServerError>> + Send>> {
        Box::pin(async { Err(ServerError::from_code(ErrorCode::InternalError)) })
    }
}

#[derive(Clone)]
pub struct OAuthState {
    pub github_client_id: String,
    pub github_client_secret: String,
    pub github_exchange: Arc<dyn GithubExchange>,
    pub token_service: Arc<IdentityTokenService>,
    pub store: CommentStore,
}

pub fn router(state: OAuthState) -> Router {
    Router::new().route("/oauth/callback", get(oauth_callback)).with_state(state)
}

#[derive(Debug, Deserialize)]
struct OAuthCallbackQuery {
    code: String,
    state: String,
}

/// The `state` parameter round-tripped through GitHub: JSON carrying the
/// wiki page URL the reader started from.
#[derive(Debug, Deserialize)]
struct CallbackState {
    redirect: String,
}

async fn oauth_callback(
    State(state): State<OAuthState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Response, ServerError> {
    let callback_state: CallbackState = serde_json::from_str(&query.state).map_err(|_| {
        ServerError::new(ErrorCode::ValidationFailed, "state must be JSON with a redirect field")
    })?;
    let redirect = validate_redirect_url(&callback_state.redirect)?;

    let tokens = state
        .github_exchange
        .exchange_code(&query.code, &state.github_client_id, &state.github_client_secret)
        .await?;
    let profile = state.github_exchange.get_user_info(&tokens.access_token).await?;

    let identity = CommenterIdentity {
        commenter: Commenter {
            oauth_provider: GITHUB_PROVIDER.to_owned(),
            oauth_user_id: profile.user_id,
        },
        display_name: profile.display_name,
    };

    state
        .store
        .register_user(&identity.commenter, &identity.display_name)
        .await
        .map_err(|error| {
            tracing::error!(error = ?error, "failed to register signed-in user");
            ServerError::from_code(ErrorCode::InternalError)
        })?;

    let token = state
        .token_service
        .issue_identity_token(&identity)
        .map_err(|_| ServerError::from_code(ErrorCode::InternalError))?;

    found_redirect(redirect, &token)
}

fn validate_redirect_url(raw: &str) -> Result<Url, ServerError> {
    let parsed = Url::parse(raw).map_err(|_| {
        ServerError::new(ErrorCode::ValidationFailed, "redirect must be an absolute URL")
    })?;

    let host = parsed.host_str().unwrap_or_default();
    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if is_loopback_host(host) => Ok(parsed),
        _ => Err(ServerError::new(
            ErrorCode::ValidationFailed,
            "redirect must use https or localhost http",
        )),
    }
}

fn is_loopback_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// 302 back to the wiki page with the identity token appended. Plain
/// `Redirect` maps to 303/307; browsers coming from GitHub expect 302.
fn found_redirect(mut redirect: Url, token: &str) -> Result<Response, ServerError> {
    redirect.query_pairs_mut().append_pair("oauth_token", token);

    let location = HeaderValue::from_str(redirect.as_str())
        .map_err(|_| ServerError::from_code(ErrorCode::InternalError))?;

    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(LOCATION, location);
    *response.body_mut() = Body::empty();
    Ok(response)
}
