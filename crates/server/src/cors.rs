// CORS middleware configuration for the comment API.
//
// Reads allowed wiki origins from the `MARGINALIA_CORS_ORIGINS` environment
// variable (comma-separated). Falls back to permissive localhost defaults
// for local static-site previews.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Default origins allowed when `MARGINALIA_CORS_ORIGINS` is unset.
const DEFAULT_DEV_ORIGINS: &[&str] = &[
    "http://localhost:8080",
    "http://localhost:1313",
    "http://127.0.0.1:8080",
    "http://127.0.0.1:1313",
];

/// Build a [`CorsLayer`] for the configured wiki origins.
///
/// - `Some("*")` allows any origin (and drops credentials, per the CORS spec).
/// - A comma-separated list allows exactly those origins.
/// - `None` allows the default local-preview origins.
pub fn cors_layer(configured_origins: Option<String>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600));

    match configured_origins.as_deref() {
        Some("*") => base.allow_origin(AllowOrigin::any()).allow_credentials(false),
        Some(origins) => base.allow_origin(parse_origins(origins)),
        None => base.allow_origin(parse_origins(&DEFAULT_DEV_ORIGINS.join(","))),
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect()
}
