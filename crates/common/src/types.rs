// Wire types shared between the store and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anchor::OffsetSpan;

/// Minimum comment body length in characters.
pub const MIN_COMMENT_CHARS: usize = 1;

/// Maximum comment body length in characters.
pub const MAX_COMMENT_CHARS: usize = 65_535;

/// Identity of a comment's author: the OAuth provider plus the
/// provider-scoped user id. Compared structurally — two values are the
/// same commenter iff both fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commenter {
    pub oauth_provider: String,
    pub oauth_user_id: String,
}

/// A stored comment as returned by `GET /comment/{path}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub path: String,
    pub offset: OffsetSpan,
    pub commenter: Commenter,
    /// Display name captured from the OAuth provider at sign-in.
    pub commenter_name: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Check a comment body against the allowed length range.
pub fn comment_body_in_range(body: &str) -> bool {
    let chars = body.chars().count();
    (MIN_COMMENT_CHARS..=MAX_COMMENT_CHARS).contains(&chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commenter_equality_is_structural() {
        let a = Commenter { oauth_provider: "github".into(), oauth_user_id: "42".into() };
        let b = Commenter { oauth_provider: "github".into(), oauth_user_id: "42".into() };
        let c = Commenter { oauth_provider: "gitlab".into(), oauth_user_id: "42".into() };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn body_length_bounds() {
        assert!(!comment_body_in_range(""));
        assert!(comment_body_in_range("x"));
        assert!(comment_body_in_range(&"y".repeat(65_535)));
        assert!(!comment_body_in_range(&"y".repeat(65_536)));
    }

    #[test]
    fn body_length_counts_chars_not_bytes() {
        // 65,535 multi-byte characters are still in range.
        assert!(comment_body_in_range(&"图".repeat(65_535)));
    }
}
