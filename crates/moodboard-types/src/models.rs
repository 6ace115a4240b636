//! Stored document shapes.
//!
//! Every document carries its own id so a decoded value is self-describing.
//! Field names are camelCase on the wire.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Same as the identity provider's principal id.
    pub id: String,
    /// Unique display handle.
    pub handle: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// The fixed icon set a post can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    #[serde(rename = "😊")]
    Happy,
    #[serde(rename = "😢")]
    Sad,
    #[serde(rename = "😠")]
    Angry,
    #[serde(rename = "😲")]
    Surprised,
    #[serde(rename = "😨")]
    Afraid,
    #[serde(rename = "❤️")]
    Love,
    #[serde(rename = "😎")]
    Cool,
    #[serde(rename = "🤔")]
    Thinking,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Afraid,
        Emotion::Love,
        Emotion::Cool,
        Emotion::Thinking,
    ];

    pub fn emoji(self) -> &'static str {
        match self {
            Emotion::Happy => "😊",
            Emotion::Sad => "😢",
            Emotion::Angry => "😠",
            Emotion::Surprised => "😲",
            Emotion::Afraid => "😨",
            Emotion::Love => "❤️",
            Emotion::Cool => "😎",
            Emotion::Thinking => "🤔",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Afraid => "afraid",
            Emotion::Love => "love",
            Emotion::Cool => "cool",
            Emotion::Thinking => "thinking",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.emoji())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEmotion(pub String);

impl fmt::Display for UnknownEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown emotion: {}", self.0)
    }
}

impl std::error::Error for UnknownEmotion {}

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    /// Accepts either the emoji or its lowercase name. The heart is also
    /// accepted without its variation selector.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "❤" {
            return Ok(Emotion::Love);
        }
        Emotion::ALL
            .into_iter()
            .find(|e| e.emoji() == s || e.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub emotion: Emotion,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Denormalized count of like edges.
    #[serde(default)]
    pub like_count: i64,
    /// Written once at creation; the comments sub-collection is authoritative.
    #[serde(default)]
    pub comment_count: i64,
}

/// Like edge, stored at `posts/{postId}/likes/{userId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub user_id: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Keyed by `{senderId}_{receiverId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: FriendRequestStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl FriendRequest {
    pub fn key(sender_id: &str, receiver_id: &str) -> String {
        format!("{sender_id}_{receiver_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    FriendRequest,
    Like,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub is_read: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_parses_emoji_and_name() {
        assert_eq!("😊".parse::<Emotion>().unwrap(), Emotion::Happy);
        assert_eq!("Thinking".parse::<Emotion>().unwrap(), Emotion::Thinking);
        assert_eq!("❤".parse::<Emotion>().unwrap(), Emotion::Love);
        assert!("🦀".parse::<Emotion>().is_err());
    }

    #[test]
    fn emotion_serializes_as_emoji() {
        let json = serde_json::to_string(&Emotion::Surprised).unwrap();
        assert_eq!(json, "\"😲\"");
    }

    #[test]
    fn notification_kind_is_stored_under_type() {
        let n = Notification {
            id: "n1".into(),
            kind: NotificationKind::FriendRequest,
            sender_id: "a".into(),
            receiver_id: "b".into(),
            post_id: None,
            content: None,
            is_read: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "friendRequest");
        assert_eq!(value["isRead"], false);
    }
}
