// Commit-hash write fence.
//
// Every mutation carries the commit hash the client's page was built from.
// The stored hash is advanced by the deploy pipeline; a mismatch means the
// client is looking at a stale page and the offsets it is about to anchor
// against no longer describe the live document.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::store::StoreError;

const SITE_META_ROW: i16 = 1;

#[derive(Clone)]
pub enum CommitHashGuard {
    Postgres(PgPool),
    Memory(Arc<RwLock<String>>),
}

impl CommitHashGuard {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(String::new())))
    }

    /// Replace the stored hash. Called by the deploy pipeline after a build.
    pub async fn set(&self, hash: &str) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => set_pg(pool, hash).await,
            Self::Memory(stored) => {
                *stored.write().await = hash.to_owned();
                Ok(())
            }
        }
    }

    /// Whether `candidate` matches the stored hash. An empty stored hash
    /// (fresh install, never set) matches nothing, so writes stay fenced
    /// until the first deploy records a hash.
    pub async fn matches(&self, candidate: &str) -> Result<bool, StoreError> {
        let stored = self.current().await?;
        Ok(!stored.is_empty() && stored == candidate)
    }

    pub async fn current(&self) -> Result<String, StoreError> {
        match self {
            Self::Postgres(pool) => current_pg(pool).await,
            Self::Memory(stored) => Ok(stored.read().await.clone()),
        }
    }
}

async fn set_pg(pool: &PgPool, hash: &str) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO site_meta (id, commit_hash) VALUES ($1, $2) \
         ON CONFLICT (id) DO UPDATE SET commit_hash = EXCLUDED.commit_hash",
    )
    .bind(SITE_META_ROW)
    .bind(hash)
    .execute(pool)
    .await
    .map_err(|error| StoreError::Internal(error.into()))?;

    Ok(())
}

async fn current_pg(pool: &PgPool) -> Result<String, StoreError> {
    let stored: Option<String> =
        sqlx::query_scalar("SELECT commit_hash FROM site_meta WHERE id = $1")
            .bind(SITE_META_ROW)
            .fetch_optional(pool)
            .await
            .map_err(|error| StoreError::Internal(error.into()))?;

    Ok(stored.unwrap_or_default())
}
