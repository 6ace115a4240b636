//! Notification fan-out and the unread inbox.

use futures_util::future::try_join_all;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use moodboard_db::{Direction, FieldUpdate, Query};
use moodboard_types::api::NotificationView;
use moodboard_types::models::{Notification, NotificationKind};

use crate::MoodBoard;
use crate::collections::{NOTIFICATIONS, decode_all, encode};
use crate::error::{Error, Result, require};

pub const UNREAD_LIMIT: usize = 20;
pub const MAX_UNREAD: usize = 50;

/// Comment excerpts longer than this are cut in notification text.
const EXCERPT_CHARS: usize = 80;

fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() { format!("{head}…") } else { head }
}

fn describe(kind: NotificationKind, handle: &str, comment: Option<&str>) -> String {
    match kind {
        NotificationKind::Like => format!("{handle} liked your post"),
        NotificationKind::Comment => {
            format!("{handle} commented: {}", excerpt(comment.unwrap_or_default()))
        }
        NotificationKind::FriendRequest => format!("{handle} sent you a friend request"),
    }
}

impl MoodBoard {
    /// Write a notification for `receiver_id`.
    pub async fn notify(
        &self,
        kind: NotificationKind,
        sender_id: &str,
        receiver_id: &str,
        post_id: Option<&str>,
        comment: Option<&str>,
    ) -> Result<Notification> {
        let sender = self.user_summary(sender_id).await?;
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            kind,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            post_id: post_id.map(str::to_string),
            content: Some(describe(kind, &sender.handle, comment)),
            is_read: false,
            created_at: self.store.server_time(),
        };
        self.store
            .create(NOTIFICATIONS, &notification.id, encode(&notification)?)
            .await?;
        debug!("Notified {} ({:?} from {})", receiver_id, kind, sender_id);
        Ok(notification)
    }

    /// Notification side effect of a mutation. The mutation has already
    /// succeeded, so a failure here is logged and swallowed.
    pub(crate) async fn fan_out(
        &self,
        kind: NotificationKind,
        sender_id: &str,
        receiver_id: &str,
        post_id: Option<&str>,
        comment: Option<&str>,
    ) {
        if sender_id == receiver_id {
            return;
        }
        if let Err(e) = self.notify(kind, sender_id, receiver_id, post_id, comment).await {
            warn!("Failed to notify {} of {:?}: {}", receiver_id, kind, e);
        }
    }

    /// Newest unread notifications for a user, at most `limit` (default 20,
    /// capped at 50).
    pub async fn list_unread(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationView>> {
        require(user_id, "user id")?;
        let limit = limit.unwrap_or(UNREAD_LIMIT);
        if limit == 0 {
            return Err(Error::Validation("limit must be positive".into()));
        }
        let docs = self
            .store
            .query(
                NOTIFICATIONS,
                Query::new()
                    .eq("receiverId", user_id)
                    .eq("isRead", false)
                    .order_by("createdAt", Direction::Desc)
                    .limit(limit.min(MAX_UNREAD)),
            )
            .await?;
        let notifications: Vec<Notification> = decode_all(docs)?;

        try_join_all(notifications.into_iter().map(|n| self.notification_view(n))).await
    }

    async fn notification_view(&self, n: Notification) -> Result<NotificationView> {
        let sender = self.user_summary(&n.sender_id).await?;
        Ok(NotificationView {
            id: n.id,
            kind: n.kind,
            sender_id: n.sender_id,
            sender_handle: sender.handle,
            post_id: n.post_id,
            content: n.content,
            is_read: n.is_read,
            created_at: n.created_at,
        })
    }

    pub async fn get_notification(&self, notification_id: &str) -> Result<Notification> {
        require(notification_id, "notification id")?;
        self.fetch_required(NOTIFICATIONS, notification_id, "notification")
            .await
    }

    /// Idempotent: marking an already-read notification is a no-op write.
    pub async fn mark_read(&self, notification_id: &str) -> Result<()> {
        require(notification_id, "notification id")?;
        self.store
            .update(
                NOTIFICATIONS,
                notification_id,
                vec![FieldUpdate::set("isRead", true)],
            )
            .await?;
        Ok(())
    }

    /// Mark every unread notification of `kind` from `sender_id` to
    /// `receiver_id` as read.
    pub(crate) async fn settle_notifications(
        &self,
        kind: NotificationKind,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<usize> {
        let docs = self
            .store
            .query(
                NOTIFICATIONS,
                Query::new()
                    .eq("receiverId", receiver_id)
                    .eq("senderId", sender_id)
                    .eq("type", serde_json::to_value(kind)?)
                    .eq("isRead", false),
            )
            .await?;
        let ids: Vec<String> = docs.into_iter().map(|doc| doc.id).collect();
        try_join_all(ids.iter().map(|id| self.mark_read(id))).await?;
        Ok(ids.len())
    }
}

/// Whether a stored notification body is addressed to `user_id`.
pub(crate) fn addressed_to(data: &Value, user_id: &str) -> bool {
    data.get("receiverId").and_then(Value::as_str) == Some(user_id)
}
