// Best-effort notification of new comments.
//
// Mutations never wait on, or fail because of, a notifier. The default
// deployment logs the event; chat integrations plug in behind the trait.

use std::{future::Future, pin::Pin, sync::Arc};

use marginalia_common::types::Comment;

/// Sink for "a comment was posted" events. Boxed futures keep the trait
/// object-safe so deployments can swap implementations at runtime.
pub trait CommentNotifier: Send + Sync {
    fn comment_created(
        &self,
        comment: &Comment,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
}

/// Notifier that records the event in the log and does nothing else.
pub struct LogNotifier;

impl CommentNotifier for LogNotifier {
    fn comment_created(
        &self,
        comment: &Comment,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> {
        let path = comment.path.clone();
        let id = comment.id;
        let commenter = comment.commenter_name.clone();
        Box::pin(async move {
            tracing::info!(%path, id, %commenter, "comment created");
            Ok(())
        })
    }
}

/// Fire-and-forget dispatch: the request that created the comment returns
/// without waiting, and a notifier failure only produces a warning.
pub fn spawn_comment_created(notifier: Arc<dyn CommentNotifier>, comment: Comment) {
    tokio::spawn(async move {
        if let Err(error) = notifier.comment_created(&comment).await {
            tracing::warn!(error = ?error, path = %comment.path, "comment notification failed");
        }
    });
}
