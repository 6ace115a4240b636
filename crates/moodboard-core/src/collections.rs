//! Collection names and typed document access.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use moodboard_db::Document;
use moodboard_types::api::UserSummary;
use moodboard_types::models::User;
use tracing::warn;

use crate::MoodBoard;
use crate::error::{Error, Result};

pub const USERS: &str = "users";
pub const HANDLES: &str = "handles";
pub const POSTS: &str = "posts";
pub const FRIEND_REQUESTS: &str = "friendRequests";
pub const PENDING_PAIRS: &str = "pendingPairs";
pub const NOTIFICATIONS: &str = "notifications";
pub const LIKES: &str = "likes";
pub const COMMENTS: &str = "comments";

/// Shown in place of an author whose profile is gone.
pub(crate) const ANONYMOUS: &str = "Anonymous";

pub(crate) fn likes(post_id: &str) -> String {
    format!("{POSTS}/{post_id}/{LIKES}")
}

pub(crate) fn comments(post_id: &str) -> String {
    format!("{POSTS}/{post_id}/{COMMENTS}")
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>> {
    docs.iter()
        .map(|doc| doc.decode().map_err(Error::from))
        .collect()
}

pub(crate) fn summary(user: &User) -> UserSummary {
    UserSummary {
        id: user.id.clone(),
        handle: user.handle.clone(),
        avatar_url: user.avatar_url.clone(),
    }
}

impl MoodBoard {
    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        match self.store.get(collection, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn fetch_required<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        what: &str,
    ) -> Result<T> {
        self.fetch(collection, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{what} {id}")))
    }

    /// Author join for a post, comment or notification. A missing profile
    /// degrades to a placeholder instead of failing the whole view.
    pub(crate) async fn user_summary(&self, user_id: &str) -> Result<UserSummary> {
        match self.fetch::<User>(USERS, user_id).await? {
            Some(user) => Ok(summary(&user)),
            None => {
                warn!("User {} not found, showing placeholder", user_id);
                Ok(UserSummary {
                    id: user_id.to_string(),
                    handle: ANONYMOUS.to_string(),
                    avatar_url: None,
                })
            }
        }
    }
}
