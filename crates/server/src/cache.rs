// Read-through response cache for comment listings.
//
// Listings are cached per (origin, path) so the same document served from
// several wiki origins keeps independent entries. Entries never expire on
// their own; mutations purge the path eagerly, so readers observe eventual
// consistency bounded by the purge task.

use std::{collections::HashMap, sync::Arc};

use axum::body::Bytes;
use tokio::sync::RwLock;

/// In-memory listing cache shared across request handlers.
#[derive(Debug, Clone, Default)]
pub struct ListingCache {
    entries: Arc<RwLock<HashMap<CacheKey, Bytes>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    origin: String,
    path: String,
}

impl ListingCache {
    pub fn new() -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Look up a cached listing body for a document as served from `origin`.
    pub async fn get(&self, origin: &str, path: &str) -> Option<Bytes> {
        let guard = self.entries.read().await;
        guard.get(&CacheKey { origin: origin.to_owned(), path: path.to_owned() }).cloned()
    }

    /// Store a freshly serialized listing body.
    pub async fn put(&self, origin: &str, path: &str, body: Bytes) {
        let mut guard = self.entries.write().await;
        guard.insert(CacheKey { origin: origin.to_owned(), path: path.to_owned() }, body);
    }

    /// Drop every cached listing for `path`, across all origins.
    /// Returns the number of entries removed.
    pub async fn purge_path(&self, path: &str) -> usize {
        let mut guard = self.entries.write().await;
        let before = guard.len();
        guard.retain(|key, _| key.path != path);
        before - guard.len()
    }

    /// Drop every cached listing. Used after bulk rewrites that touch
    /// an unknown set of paths, and by the admin purge endpoint.
    pub async fn purge_all(&self) -> usize {
        let mut guard = self.entries.write().await;
        let removed = guard.len();
        guard.clear();
        removed
    }

    /// Number of cached listings.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no listings.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
