use std::net::SocketAddr;

use anyhow::{bail, Context, Result};

/// Minimum length enforced for shared secrets loaded from the environment.
pub const MIN_SECRET_CHARS: usize = 32;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// When absent the server runs on the in-memory backend.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub admin_secret: String,
    pub github_client_id: String,
    pub github_client_secret: String,
    pub cors_origins: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_env_fn(|name| std::env::var(name).ok())
    }

    /// Environment access goes through `env_fn` so tests can supply a fixed
    /// environment without mutating process state.
    pub fn from_env_fn(env_fn: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = env_fn("MARGINALIA_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse::<SocketAddr>()
            .context("MARGINALIA_BIND_ADDR must be a host:port socket address")?;

        let database_url = non_empty(env_fn("MARGINALIA_DATABASE_URL"));

        let jwt_secret = required_secret(&env_fn, "MARGINALIA_JWT_SECRET")?;
        let admin_secret = required_secret(&env_fn, "MARGINALIA_ADMIN_SECRET")?;

        let github_client_id = non_empty(env_fn("MARGINALIA_GITHUB_CLIENT_ID"))
            .context("MARGINALIA_GITHUB_CLIENT_ID is required")?;
        let github_client_secret = non_empty(env_fn("MARGINALIA_GITHUB_CLIENT_SECRET"))
            .context("MARGINALIA_GITHUB_CLIENT_SECRET is required")?;

        Ok(Self {
            bind_addr,
            database_url,
            jwt_secret,
            admin_secret,
            github_client_id,
            github_client_secret,
            cors_origins: non_empty(env_fn("MARGINALIA_CORS_ORIGINS")),
        })
    }
}

fn required_secret(env_fn: impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    let Some(value) = non_empty(env_fn(name)) else {
        bail!("{name} is required");
    };
    if value.chars().count() < MIN_SECRET_CHARS {
        bail!("{name} must be at least {MIN_SECRET_CHARS} characters");
    }
    Ok(value)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}
