//! Post creation and per-post reads.

use tracing::info;
use uuid::Uuid;

use moodboard_db::{Direction, Query};
use moodboard_types::api::{PostDetail, PostView};
use moodboard_types::models::{Emotion, Post, User};

use crate::MoodBoard;
use crate::collections::{POSTS, USERS, decode_all, encode};
use crate::error::{Error, Result, require};

pub const MAX_POST_CHARS: usize = 2000;
pub const DEFAULT_USER_POSTS: usize = 20;

impl MoodBoard {
    pub async fn create_post(
        &self,
        author_id: &str,
        content: &str,
        emotion: Emotion,
    ) -> Result<PostView> {
        require(author_id, "user id")?;
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Validation("post content cannot be empty".into()));
        }
        if content.chars().count() > MAX_POST_CHARS {
            return Err(Error::Validation(format!(
                "post is longer than {MAX_POST_CHARS} characters"
            )));
        }

        let author: User = self.fetch_required(USERS, author_id, "user").await?;
        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: author.id.clone(),
            content: content.to_string(),
            emotion,
            created_at: self.store.server_time(),
            like_count: 0,
            comment_count: 0,
        };
        self.store.create(POSTS, &post.id, encode(&post)?).await?;
        info!("Post {} created by {} ({})", post.id, author.handle, emotion.name());

        Ok(PostView {
            id: post.id,
            author_id: author.id,
            author_handle: author.handle,
            author_avatar_url: author.avatar_url,
            content: post.content,
            emotion: post.emotion,
            created_at: post.created_at,
            like_count: 0,
            comment_count: 0,
            is_liked: false,
        })
    }

    /// A single post with all of its comments, newest first.
    pub async fn get_post(&self, post_id: &str, viewer_id: &str) -> Result<PostDetail> {
        require(post_id, "post id")?;
        let post: Post = self.fetch_required(POSTS, post_id, "post").await?;
        let (post, comments) =
            tokio::try_join!(self.post_view(post, viewer_id), self.list_comments(post_id))?;
        Ok(PostDetail { post, comments })
    }

    /// Posts by one author, newest first.
    pub async fn list_user_posts(
        &self,
        author_id: &str,
        viewer_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PostView>> {
        require(author_id, "user id")?;
        let limit = limit
            .unwrap_or(DEFAULT_USER_POSTS)
            .clamp(1, crate::feed::MAX_PAGE_SIZE);
        let docs = self
            .store
            .query(
                POSTS,
                Query::new()
                    .eq("authorId", author_id)
                    .order_by("createdAt", Direction::Desc)
                    .limit(limit),
            )
            .await?;
        self.enrich_posts(decode_all(docs)?, viewer_id).await
    }
}
