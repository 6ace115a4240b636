//! Paginated global feed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures_util::future::try_join_all;
use tracing::debug;

use moodboard_db::{Cursor, Direction, Document, Query};
use moodboard_types::api::{FeedPage, PostView};
use moodboard_types::models::Post;

use crate::MoodBoard;
use crate::collections::{POSTS, comments, decode_all, likes};
use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 50;

const ORDER_FIELD: &str = "createdAt";

/// Page token carrying the last post's `createdAt` and id, so the next page
/// does not depend on that post still existing.
fn encode_cursor(doc: &Document) -> Option<String> {
    let created_at = doc.field(ORDER_FIELD)?.as_str()?;
    Some(URL_SAFE_NO_PAD.encode(format!("{created_at}|{}", doc.id)))
}

fn decode_cursor(token: &str) -> Result<Cursor> {
    let invalid = || Error::Validation("invalid feed cursor".into());
    let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    let raw = String::from_utf8(raw).map_err(|_| invalid())?;
    match raw.split_once('|') {
        Some((created_at, id)) if !created_at.is_empty() && !id.is_empty() => {
            Ok(Cursor::new(created_at, id))
        }
        _ => Err(invalid()),
    }
}

impl MoodBoard {
    /// One page of posts from every author, newest first.
    ///
    /// `cursor` is the `next_cursor` of the previous page. It stays valid
    /// even if that page's last post has since been deleted. The returned
    /// `next_cursor` is `None` once a page comes back short, which signals
    /// the end of the feed.
    pub async fn get_feed_page(
        &self,
        viewer_id: &str,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Result<FeedPage> {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(Error::Validation("page size must be positive".into()));
        }
        let page_size = page_size.min(MAX_PAGE_SIZE);
        let cursor = cursor.map(decode_cursor).transpose()?;

        let docs = self
            .store
            .query(
                POSTS,
                Query::new()
                    .order_by(ORDER_FIELD, Direction::Desc)
                    .start_after(cursor)
                    .limit(page_size),
            )
            .await?;

        let next_cursor = if docs.len() == page_size {
            docs.last().and_then(encode_cursor)
        } else {
            None
        };
        let posts = self.enrich_posts(decode_all(docs)?, viewer_id).await?;

        debug!(
            "Feed page for {}: {} posts, more={}",
            viewer_id,
            posts.len(),
            next_cursor.is_some()
        );
        Ok(FeedPage { posts, next_cursor })
    }

    /// Join every post with its author, the viewer's like edge and the live
    /// comment count. Posts are enriched concurrently; order is preserved.
    pub(crate) async fn enrich_posts(
        &self,
        posts: Vec<Post>,
        viewer_id: &str,
    ) -> Result<Vec<PostView>> {
        try_join_all(posts.into_iter().map(|post| self.post_view(post, viewer_id))).await
    }

    pub(crate) async fn post_view(&self, post: Post, viewer_id: &str) -> Result<PostView> {
        let like_edges = likes(&post.id);
        let comment_docs = comments(&post.id);

        let (author, like, comment_count) = tokio::try_join!(
            self.user_summary(&post.author_id),
            async { Ok::<_, Error>(self.store.get(&like_edges, viewer_id).await?) },
            async { Ok::<_, Error>(self.store.count(&comment_docs, Vec::new()).await?) },
        )?;

        Ok(PostView {
            id: post.id,
            author_id: post.author_id,
            author_handle: author.handle,
            author_avatar_url: author.avatar_url,
            content: post.content,
            emotion: post.emotion,
            created_at: post.created_at,
            like_count: post.like_count,
            comment_count,
            is_liked: like.is_some(),
        })
    }
}
