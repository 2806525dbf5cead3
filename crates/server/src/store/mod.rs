// Comment persistence with two interchangeable backends.
//
// `CommentStore::Postgres` is the production backend; `CommentStore::Memory`
// backs tests and local development without a database. Every operation has
// a `*_pg` and a `*_mem` twin dispatched from the enum.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Context;
use sqlx::{
    types::chrono::{DateTime, Utc},
    PgPool,
};
use thiserror::Error;
use tokio::sync::RwLock;

use marginalia_common::{
    anchor::{transform_span, ContentEdit, OffsetSpan},
    types::{Comment, Commenter},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("comment not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Input for `CommentStore::create`.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub path: String,
    pub offset: OffsetSpan,
    pub commenter: Commenter,
    pub commenter_name: String,
    pub comment: String,
}

#[derive(Clone)]
pub enum CommentStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryCommentStore>>),
}

#[derive(Default)]
pub struct MemoryCommentStore {
    comments: BTreeMap<i64, StoredComment>,
    users: HashMap<Commenter, String>,
    next_id: i64,
}

#[derive(Clone)]
struct StoredComment {
    id: i64,
    path: String,
    offset: OffsetSpan,
    commenter: Commenter,
    commenter_name: String,
    comment: String,
    created_at: DateTime<Utc>,
}

impl From<StoredComment> for Comment {
    fn from(value: StoredComment) -> Self {
        Self {
            id: value.id,
            path: value.path,
            offset: value.offset,
            commenter: value.commenter,
            commenter_name: value.commenter_name,
            comment: value.comment,
            created_at: value.created_at,
        }
    }
}

// ── SQL rows ─────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    path: String,
    start_offset: i64,
    end_offset: i64,
    oauth_provider: String,
    oauth_user_id: String,
    commenter_name: String,
    comment: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OwnerRow {
    oauth_provider: String,
    oauth_user_id: String,
}

impl From<CommentRow> for Comment {
    fn from(value: CommentRow) -> Self {
        Self {
            id: value.id,
            path: value.path,
            offset: OffsetSpan {
                start: offset_from_db(value.start_offset),
                end: offset_from_db(value.end_offset),
            },
            commenter: Commenter {
                oauth_provider: value.oauth_provider,
                oauth_user_id: value.oauth_user_id,
            },
            commenter_name: value.commenter_name,
            comment: value.comment,
            created_at: value.created_at,
        }
    }
}

// Offsets are persisted as BIGINT but only ever written from u32 values.
fn offset_from_db(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

const SELECT_COMMENT_COLUMNS: &str = "SELECT id, path, start_offset, end_offset, \
     oauth_provider, oauth_user_id, commenter_name, comment, created_at FROM comments";

// ── Schema ───────────────────────────────────────────────────────────────────

/// Create the tables the server needs if they are missing. Run at startup
/// on the Postgres backend.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS comments (
            id BIGSERIAL PRIMARY KEY,
            path TEXT NOT NULL,
            start_offset BIGINT NOT NULL,
            end_offset BIGINT NOT NULL,
            oauth_provider TEXT NOT NULL,
            oauth_user_id TEXT NOT NULL,
            commenter_name TEXT NOT NULL,
            comment TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "CREATE INDEX IF NOT EXISTS comments_path_idx ON comments (path)",
        "CREATE TABLE IF NOT EXISTS users (
            oauth_provider TEXT NOT NULL,
            oauth_user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            first_seen_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (oauth_provider, oauth_user_id)
        )",
        "CREATE TABLE IF NOT EXISTS site_meta (
            id SMALLINT PRIMARY KEY,
            commit_hash TEXT NOT NULL
        )",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("failed to apply comment schema")?;
    }
    Ok(())
}

// ── Store dispatch ───────────────────────────────────────────────────────────

impl CommentStore {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryCommentStore::default())))
    }

    pub async fn create(&self, new_comment: NewComment) -> Result<Comment, StoreError> {
        match self {
            Self::Postgres(pool) => create_pg(pool, new_comment).await,
            Self::Memory(store) => create_mem(store, new_comment).await,
        }
    }

    /// Identity of the author of comment `id` on `path`, if such a comment
    /// exists. The path scoping means an id guessed under the wrong path
    /// behaves exactly like a missing comment.
    pub async fn get_owner(&self, path: &str, id: i64) -> Result<Option<Commenter>, StoreError> {
        match self {
            Self::Postgres(pool) => get_owner_pg(pool, path, id).await,
            Self::Memory(store) => get_owner_mem(store, path, id).await,
        }
    }

    pub async fn update_body(&self, path: &str, id: i64, body: &str) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => update_body_pg(pool, path, id, body).await,
            Self::Memory(store) => update_body_mem(store, path, id, body).await,
        }
    }

    pub async fn delete(&self, path: &str, id: i64) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => delete_pg(pool, path, id).await,
            Self::Memory(store) => delete_mem(store, path, id).await,
        }
    }

    /// All comments on `path`, oldest first.
    pub async fn list_by_path(&self, path: &str) -> Result<Vec<Comment>, StoreError> {
        match self {
            Self::Postgres(pool) => list_by_path_pg(pool, path).await,
            Self::Memory(store) => list_by_path_mem(store, path).await,
        }
    }

    /// Move every comment from `old_path` to `new_path`. Returns the number
    /// of comments moved; zero is not an error.
    pub async fn rename_path(&self, old_path: &str, new_path: &str) -> Result<u64, StoreError> {
        match self {
            Self::Postgres(pool) => rename_path_pg(pool, old_path, new_path).await,
            Self::Memory(store) => rename_path_mem(store, old_path, new_path).await,
        }
    }

    /// Remap the anchors of every comment on `path` through a batch of
    /// content edits. Atomic per path: readers never observe a half-shifted
    /// set. Returns the number of comments whose anchors changed.
    pub async fn apply_edits(&self, path: &str, edits: &[ContentEdit]) -> Result<u64, StoreError> {
        match self {
            Self::Postgres(pool) => apply_edits_pg(pool, path, edits).await,
            Self::Memory(store) => apply_edits_mem(store, path, edits).await,
        }
    }

    /// Record (or refresh) a signed-in user. Called from the OAuth callback.
    pub async fn register_user(&self, commenter: &Commenter, name: &str) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => register_user_pg(pool, commenter, name).await,
            Self::Memory(store) => register_user_mem(store, commenter, name).await,
        }
    }
}

// ── Postgres backend ─────────────────────────────────────────────────────────

async fn create_pg(pool: &PgPool, new_comment: NewComment) -> Result<Comment, StoreError> {
    let row: CommentRow = sqlx::query_as(
        "INSERT INTO comments \
             (path, start_offset, end_offset, oauth_provider, oauth_user_id, \
              commenter_name, comment) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id, path, start_offset, end_offset, oauth_provider, \
                   oauth_user_id, commenter_name, comment, created_at",
    )
    .bind(&new_comment.path)
    .bind(i64::from(new_comment.offset.start))
    .bind(i64::from(new_comment.offset.end))
    .bind(&new_comment.commenter.oauth_provider)
    .bind(&new_comment.commenter.oauth_user_id)
    .bind(&new_comment.commenter_name)
    .bind(&new_comment.comment)
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(row.into())
}

async fn get_owner_pg(pool: &PgPool, path: &str, id: i64) -> Result<Option<Commenter>, StoreError> {
    let row: Option<OwnerRow> = sqlx::query_as(
        "SELECT oauth_provider, oauth_user_id FROM comments WHERE id = $1 AND path = $2",
    )
    .bind(id)
    .bind(path)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(row.map(|owner| Commenter {
        oauth_provider: owner.oauth_provider,
        oauth_user_id: owner.oauth_user_id,
    }))
}

async fn update_body_pg(pool: &PgPool, path: &str, id: i64, body: &str) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE comments SET comment = $1 WHERE id = $2 AND path = $3")
        .bind(body)
        .bind(id)
        .bind(path)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

async fn delete_pg(pool: &PgPool, path: &str, id: i64) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM comments WHERE id = $1 AND path = $2")
        .bind(id)
        .bind(path)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

async fn list_by_path_pg(pool: &PgPool, path: &str) -> Result<Vec<Comment>, StoreError> {
    let rows: Vec<CommentRow> =
        sqlx::query_as(&format!("{SELECT_COMMENT_COLUMNS} WHERE path = $1 ORDER BY id"))
            .bind(path)
            .fetch_all(pool)
            .await
            .map_err(map_sqlx_error)?;

    Ok(rows.into_iter().map(Comment::from).collect())
}

async fn rename_path_pg(pool: &PgPool, old_path: &str, new_path: &str) -> Result<u64, StoreError> {
    let result = sqlx::query("UPDATE comments SET path = $2 WHERE path = $1")
        .bind(old_path)
        .bind(new_path)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

    Ok(result.rows_affected())
}

async fn apply_edits_pg(
    pool: &PgPool,
    path: &str,
    edits: &[ContentEdit],
) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    let rows: Vec<CommentRow> =
        sqlx::query_as(&format!("{SELECT_COMMENT_COLUMNS} WHERE path = $1 FOR UPDATE"))
            .bind(path)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

    let mut changed = 0u64;
    for row in rows {
        let current = OffsetSpan {
            start: offset_from_db(row.start_offset),
            end: offset_from_db(row.end_offset),
        };
        let next = transform_span(current, edits);
        if next == current {
            continue;
        }

        sqlx::query("UPDATE comments SET start_offset = $1, end_offset = $2 WHERE id = $3")
            .bind(i64::from(next.start))
            .bind(i64::from(next.end))
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        changed += 1;
    }

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(changed)
}

async fn register_user_pg(
    pool: &PgPool,
    commenter: &Commenter,
    name: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO users (oauth_provider, oauth_user_id, name) VALUES ($1, $2, $3) \
         ON CONFLICT (oauth_provider, oauth_user_id) DO UPDATE SET name = EXCLUDED.name",
    )
    .bind(&commenter.oauth_provider)
    .bind(&commenter.oauth_user_id)
    .bind(name)
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    StoreError::Internal(error.into())
}

// ── Memory backend ───────────────────────────────────────────────────────────

async fn create_mem(
    store: &Arc<RwLock<MemoryCommentStore>>,
    new_comment: NewComment,
) -> Result<Comment, StoreError> {
    let mut guard = store.write().await;
    guard.next_id += 1;
    let stored = StoredComment {
        id: guard.next_id,
        path: new_comment.path,
        offset: new_comment.offset,
        commenter: new_comment.commenter,
        commenter_name: new_comment.commenter_name,
        comment: new_comment.comment,
        created_at: Utc::now(),
    };
    let comment = Comment::from(stored.clone());
    guard.comments.insert(stored.id, stored);
    Ok(comment)
}

async fn get_owner_mem(
    store: &Arc<RwLock<MemoryCommentStore>>,
    path: &str,
    id: i64,
) -> Result<Option<Commenter>, StoreError> {
    let guard = store.read().await;
    Ok(guard
        .comments
        .get(&id)
        .filter(|comment| comment.path == path)
        .map(|comment| comment.commenter.clone()))
}

async fn update_body_mem(
    store: &Arc<RwLock<MemoryCommentStore>>,
    path: &str,
    id: i64,
    body: &str,
) -> Result<(), StoreError> {
    let mut guard = store.write().await;
    match guard.comments.get_mut(&id).filter(|comment| comment.path == path) {
        Some(comment) => {
            comment.comment = body.to_owned();
            Ok(())
        }
        None => Err(StoreError::NotFound),
    }
}

async fn delete_mem(
    store: &Arc<RwLock<MemoryCommentStore>>,
    path: &str,
    id: i64,
) -> Result<(), StoreError> {
    let mut guard = store.write().await;
    let matches = guard.comments.get(&id).is_some_and(|comment| comment.path == path);
    if !matches {
        return Err(StoreError::NotFound);
    }
    guard.comments.remove(&id);
    Ok(())
}

async fn list_by_path_mem(
    store: &Arc<RwLock<MemoryCommentStore>>,
    path: &str,
) -> Result<Vec<Comment>, StoreError> {
    let guard = store.read().await;
    Ok(guard
        .comments
        .values()
        .filter(|comment| comment.path == path)
        .cloned()
        .map(Comment::from)
        .collect())
}

async fn rename_path_mem(
    store: &Arc<RwLock<MemoryCommentStore>>,
    old_path: &str,
    new_path: &str,
) -> Result<u64, StoreError> {
    let mut guard = store.write().await;
    let mut moved = 0u64;
    for comment in guard.comments.values_mut() {
        if comment.path == old_path {
            comment.path = new_path.to_owned();
            moved += 1;
        }
    }
    Ok(moved)
}

async fn apply_edits_mem(
    store: &Arc<RwLock<MemoryCommentStore>>,
    path: &str,
    edits: &[ContentEdit],
) -> Result<u64, StoreError> {
    let mut guard = store.write().await;
    let mut changed = 0u64;
    for comment in guard.comments.values_mut() {
        if comment.path != path {
            continue;
        }
        let next = transform_span(comment.offset, edits);
        if next != comment.offset {
            comment.offset = next;
            changed += 1;
        }
    }
    Ok(changed)
}

async fn register_user_mem(
    store: &Arc<RwLock<MemoryCommentStore>>,
    commenter: &Commenter,
    name: &str,
) -> Result<(), StoreError> {
    let mut guard = store.write().await;
    guard.users.insert(commenter.clone(), name.to_owned());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commenter(user_id: &str) -> Commenter {
        Commenter { oauth_provider: "github".into(), oauth_user_id: user_id.into() }
    }

    fn new_comment(path: &str, start: u32, end: u32, user_id: &str) -> NewComment {
        NewComment {
            path: path.into(),
            offset: OffsetSpan { start, end },
            commenter: commenter(user_id),
            commenter_name: format!("user-{user_id}"),
            comment: "a remark".into(),
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let store = CommentStore::memory();
        let first = store.create(new_comment("/doc", 0, 5, "1")).await.unwrap();
        let second = store.create(new_comment("/doc", 3, 9, "1")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_path_and_ordered() {
        let store = CommentStore::memory();
        store.create(new_comment("/doc", 0, 5, "1")).await.unwrap();
        store.create(new_comment("/other", 0, 5, "1")).await.unwrap();
        store.create(new_comment("/doc", 3, 9, "2")).await.unwrap();

        let listed = store.list_by_path("/doc").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].id < listed[1].id);
        assert!(listed.iter().all(|comment| comment.path == "/doc"));
    }

    #[tokio::test]
    async fn owner_lookup_is_path_scoped() {
        let store = CommentStore::memory();
        let created = store.create(new_comment("/doc", 0, 5, "1")).await.unwrap();

        let owner = store.get_owner("/doc", created.id).await.unwrap();
        assert_eq!(owner, Some(commenter("1")));

        // Same id under the wrong path looks like a missing comment.
        assert!(store.get_owner("/other", created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_body_replaces_text() {
        let store = CommentStore::memory();
        let created = store.create(new_comment("/doc", 0, 5, "1")).await.unwrap();

        store.update_body("/doc", created.id, "revised").await.unwrap();
        let listed = store.list_by_path("/doc").await.unwrap();
        assert_eq!(listed[0].comment, "revised");
    }

    #[tokio::test]
    async fn update_of_missing_comment_is_not_found() {
        let store = CommentStore::memory();
        let err = store.update_body("/doc", 404, "revised").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn store_errors_are_std_errors() {
        // `?` propagation and anyhow contexts rely on this impl.
        let err: Box<dyn std::error::Error> = Box::new(StoreError::NotFound);
        assert_eq!(err.to_string(), "comment not found");
    }

    #[tokio::test]
    async fn delete_removes_only_the_target() {
        let store = CommentStore::memory();
        let first = store.create(new_comment("/doc", 0, 5, "1")).await.unwrap();
        store.create(new_comment("/doc", 3, 9, "2")).await.unwrap();

        store.delete("/doc", first.id).await.unwrap();
        let listed = store.list_by_path("/doc").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_ne!(listed[0].id, first.id);
    }

    #[tokio::test]
    async fn rename_moves_every_comment_on_the_path() {
        let store = CommentStore::memory();
        store.create(new_comment("/old", 0, 5, "1")).await.unwrap();
        store.create(new_comment("/old", 3, 9, "2")).await.unwrap();
        store.create(new_comment("/keep", 0, 5, "1")).await.unwrap();

        let moved = store.rename_path("/old", "/new").await.unwrap();
        assert_eq!(moved, 2);
        assert!(store.list_by_path("/old").await.unwrap().is_empty());
        assert_eq!(store.list_by_path("/new").await.unwrap().len(), 2);
        assert_eq!(store.list_by_path("/keep").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_of_path_without_comments_moves_nothing() {
        let store = CommentStore::memory();
        assert_eq!(store.rename_path("/absent", "/new").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn apply_edits_shifts_anchors_after_the_edit() {
        let store = CommentStore::memory();
        store.create(new_comment("/doc", 6, 11, "1")).await.unwrap();

        // Replace [0, 5) with 2 characters: net delta -3.
        let edits = [ContentEdit { start: 0, end: 5, inserted_len: 2 }];
        let changed = store.apply_edits("/doc", &edits).await.unwrap();
        assert_eq!(changed, 1);

        let listed = store.list_by_path("/doc").await.unwrap();
        assert_eq!(listed[0].offset, OffsetSpan { start: 3, end: 8 });
    }

    #[tokio::test]
    async fn apply_edits_collapses_swallowed_spans() {
        let store = CommentStore::memory();
        store.create(new_comment("/doc", 2, 9, "1")).await.unwrap();

        // Delete [0, 11): the span is swallowed and collapses to a stub.
        let edits = [ContentEdit { start: 0, end: 11, inserted_len: 0 }];
        store.apply_edits("/doc", &edits).await.unwrap();

        let listed = store.list_by_path("/doc").await.unwrap();
        assert_eq!(listed[0].offset, OffsetSpan { start: 0, end: 1 });
    }

    #[tokio::test]
    async fn apply_edits_leaves_untouched_anchors_alone() {
        let store = CommentStore::memory();
        store.create(new_comment("/doc", 0, 3, "1")).await.unwrap();

        // Edit entirely after the span.
        let edits = [ContentEdit { start: 10, end: 12, inserted_len: 0 }];
        let changed = store.apply_edits("/doc", &edits).await.unwrap();
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn register_user_upserts_name() {
        let store = CommentStore::memory();
        store.register_user(&commenter("1"), "Ada").await.unwrap();
        store.register_user(&commenter("1"), "Ada L.").await.unwrap();

        if let CommentStore::Memory(inner) = &store {
            let guard = inner.read().await;
            assert_eq!(guard.users.get(&commenter("1")), Some(&"Ada L.".to_owned()));
        }
    }
}
