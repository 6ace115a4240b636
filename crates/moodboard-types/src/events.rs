use serde::{Deserialize, Serialize};

use crate::api::NotificationView;

/// Events pushed to a client over the notification stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamEvent {
    /// Stream is open for this user
    Ready { user_id: String },

    /// Current unread notifications, newest first
    Unread { notifications: Vec<NotificationView> },
}

impl StreamEvent {
    /// Name used for the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Unread { .. } => "unread",
        }
    }
}
