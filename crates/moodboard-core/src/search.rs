//! Handle prefix search and emotion filtering.

use moodboard_db::{Direction, FilterOp, Query};
use moodboard_types::api::{PostView, UserSummary};
use moodboard_types::models::{Emotion, User};

use crate::MoodBoard;
use crate::collections::{POSTS, USERS, decode_all, summary};
use crate::error::Result;

pub const SEARCH_LIMIT: usize = 20;

/// Sorts after every character a handle can contain, closing the prefix range.
const PREFIX_END: char = '\u{f8ff}';

impl MoodBoard {
    /// Users whose handle starts with `prefix` (case-sensitive), by handle.
    pub async fn search_users(&self, prefix: &str) -> Result<Vec<UserSummary>> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .store
            .query(
                USERS,
                Query::new()
                    .filter("handle", FilterOp::Ge, prefix)
                    .filter("handle", FilterOp::Le, format!("{prefix}{PREFIX_END}"))
                    .order_by("handle", Direction::Asc)
                    .limit(SEARCH_LIMIT),
            )
            .await?;
        let users: Vec<User> = decode_all(docs)?;
        Ok(users.iter().map(summary).collect())
    }

    /// The newest posts tagged with `emotion`.
    pub async fn search_posts_by_emotion(
        &self,
        emotion: Emotion,
        viewer_id: &str,
    ) -> Result<Vec<PostView>> {
        let docs = self
            .store
            .query(
                POSTS,
                Query::new()
                    .eq("emotion", emotion.emoji())
                    .order_by("createdAt", Direction::Desc)
                    .limit(SEARCH_LIMIT),
            )
            .await?;
        self.enrich_posts(decode_all(docs)?, viewer_id).await
    }
}
