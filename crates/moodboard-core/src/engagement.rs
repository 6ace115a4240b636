//! Likes, comments and post deletion.

use futures_util::future::try_join_all;
use tracing::{info, warn};
use uuid::Uuid;

use moodboard_db::{Direction, FieldUpdate, Query, StoreError};
use moodboard_types::api::{CommentView, LikeState};
use moodboard_types::models::{Comment, Like, NotificationKind, Post};

use crate::MoodBoard;
use crate::collections::{POSTS, comments, decode_all, encode, likes};
use crate::error::{Error, Result, require};

pub const MAX_COMMENT_CHARS: usize = 1000;

impl MoodBoard {
    /// Flip the viewer's like on a post.
    ///
    /// `currently_liked` is the state the caller last rendered. The edge
    /// write decides the outcome: the counter only moves when the edge
    /// actually changed, so replays do not drift the count.
    pub async fn toggle_like(
        &self,
        post_id: &str,
        viewer_id: &str,
        currently_liked: bool,
    ) -> Result<LikeState> {
        require(post_id, "post id")?;
        require(viewer_id, "user id")?;

        let post: Post = self.fetch_required(POSTS, post_id, "post").await?;
        let edges = likes(post_id);

        if currently_liked {
            if !self.store.delete(&edges, viewer_id).await? {
                return Ok(LikeState {
                    liked: false,
                    like_count: post.like_count,
                });
            }
            let mut updated: Post = self
                .store
                .update(POSTS, post_id, vec![FieldUpdate::increment("likeCount", -1)])
                .await?
                .decode()?;
            if updated.like_count < 0 {
                warn!("likeCount of {} went negative, resetting", post_id);
                updated = self
                    .store
                    .update(POSTS, post_id, vec![FieldUpdate::set("likeCount", 0)])
                    .await?
                    .decode()?;
            }
            Ok(LikeState {
                liked: false,
                like_count: updated.like_count,
            })
        } else {
            let edge = Like {
                user_id: viewer_id.to_string(),
                created_at: self.store.server_time(),
            };
            match self.store.create(&edges, viewer_id, encode(&edge)?).await {
                Ok(()) => {}
                Err(StoreError::AlreadyExists { .. }) => {
                    return Ok(LikeState {
                        liked: true,
                        like_count: post.like_count,
                    });
                }
                Err(e) => return Err(e.into()),
            }
            let updated: Post = self
                .store
                .update(POSTS, post_id, vec![FieldUpdate::increment("likeCount", 1)])
                .await?
                .decode()?;

            self.fan_out(NotificationKind::Like, viewer_id, &post.author_id, Some(post_id), None)
                .await;
            Ok(LikeState {
                liked: true,
                like_count: updated.like_count,
            })
        }
    }

    /// Append a comment and notify the post's author.
    pub async fn add_comment(
        &self,
        post_id: &str,
        author_id: &str,
        text: &str,
    ) -> Result<CommentView> {
        require(post_id, "post id")?;
        require(author_id, "user id")?;
        let content = text.trim();
        if content.is_empty() {
            return Err(Error::Validation("comment cannot be empty".into()));
        }
        if content.chars().count() > MAX_COMMENT_CHARS {
            return Err(Error::Validation(format!(
                "comment is longer than {MAX_COMMENT_CHARS} characters"
            )));
        }

        let post: Post = self.fetch_required(POSTS, post_id, "post").await?;
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            created_at: self.store.server_time(),
        };
        self.store
            .create(&comments(post_id), &comment.id, encode(&comment)?)
            .await?;

        self.fan_out(
            NotificationKind::Comment,
            author_id,
            &post.author_id,
            Some(post_id),
            Some(content),
        )
        .await;

        self.comment_view(comment).await
    }

    /// Comments on a post, newest first.
    pub async fn list_comments(&self, post_id: &str) -> Result<Vec<CommentView>> {
        require(post_id, "post id")?;
        let docs = self
            .store
            .query(
                &comments(post_id),
                Query::new().order_by("createdAt", Direction::Desc),
            )
            .await?;
        let list: Vec<Comment> = decode_all(docs)?;
        try_join_all(list.into_iter().map(|c| self.comment_view(c))).await
    }

    async fn comment_view(&self, comment: Comment) -> Result<CommentView> {
        let author = self.user_summary(&comment.author_id).await?;
        Ok(CommentView {
            id: comment.id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            author_handle: author.handle,
            author_avatar_url: author.avatar_url,
            content: comment.content,
            created_at: comment.created_at,
        })
    }

    /// Remove a post. Only its author may do so. Like and comment documents
    /// under the post are left in place and become unreachable.
    pub async fn delete_post(&self, post_id: &str, requester_id: &str) -> Result<()> {
        require(post_id, "post id")?;
        let post: Post = self.fetch_required(POSTS, post_id, "post").await?;
        if post.author_id != requester_id {
            return Err(Error::Forbidden("only the author can delete a post".into()));
        }
        self.store.delete(POSTS, post_id).await?;
        info!("Post {} deleted by {}", post_id, requester_id);
        Ok(())
    }
}
