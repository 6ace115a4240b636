//! Friend requests and the relationship state machine.
//!
//! A request lives at `friendRequests/{senderId}_{receiverId}`. Per ordered
//! pair the state runs `none -> pending -> accepted` (both users gain each
//! other as friends) or `none -> pending -> none` when the receiver rejects
//! or the sender cancels; both of those delete the request.
//!
//! While a request is pending its pair also holds a claim at
//! `pendingPairs/{low}_{high}` (ids in sorted order), so two users asking
//! each other at the same moment end up with one request between them.

use tracing::{info, warn};

use moodboard_db::{FieldUpdate, StoreError};
use moodboard_types::api::RelationshipState;
use moodboard_types::models::{FriendRequest, FriendRequestStatus, NotificationKind, User};
use moodboard_types::timestamp;

use crate::MoodBoard;
use crate::collections::{FRIEND_REQUESTS, PENDING_PAIRS, USERS, encode};
use crate::error::{Error, Result, require};

/// Direction-free key for a pair of users.
fn pair_key(a: &str, b: &str) -> String {
    if a <= b { format!("{a}_{b}") } else { format!("{b}_{a}") }
}

impl MoodBoard {
    pub async fn get_friend_request(&self, request_id: &str) -> Result<FriendRequest> {
        require(request_id, "request id")?;
        self.fetch_required(FRIEND_REQUESTS, request_id, "friend request")
            .await
    }

    /// Relationship as seen from `viewer_id`. Friendship is read from the
    /// viewer's own document only.
    pub async fn get_relationship_state(
        &self,
        viewer_id: &str,
        target_id: &str,
    ) -> Result<RelationshipState> {
        require(viewer_id, "user id")?;
        require(target_id, "user id")?;
        if viewer_id == target_id {
            return Ok(RelationshipState::Myself);
        }

        let viewer: User = self.fetch_required(USERS, viewer_id, "user").await?;
        if viewer.friends.iter().any(|id| id == target_id) {
            return Ok(RelationshipState::Friends);
        }

        let outgoing_key = FriendRequest::key(viewer_id, target_id);
        let incoming_key = FriendRequest::key(target_id, viewer_id);
        let (outgoing, incoming) = tokio::try_join!(
            self.fetch::<FriendRequest>(FRIEND_REQUESTS, &outgoing_key),
            self.fetch::<FriendRequest>(FRIEND_REQUESTS, &incoming_key),
        )?;

        Ok(match (outgoing, incoming) {
            (Some(request), _) => match request.status {
                FriendRequestStatus::Pending => RelationshipState::Pending,
                FriendRequestStatus::Accepted => RelationshipState::Accepted,
                FriendRequestStatus::Rejected => RelationshipState::Rejected,
            },
            (None, Some(request)) if request.status == FriendRequestStatus::Pending => {
                RelationshipState::Incoming
            }
            _ => RelationshipState::None,
        })
    }

    /// Open a friend request from `sender_id` to `receiver_id` and notify the
    /// receiver. Idempotent per unordered pair: if a pending request already
    /// exists in either direction it is returned and nothing is written.
    pub async fn send_friend_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<FriendRequest> {
        require(sender_id, "user id")?;
        require(receiver_id, "user id")?;
        if sender_id == receiver_id {
            return Err(Error::Validation("cannot send a friend request to yourself".into()));
        }

        let (sender, _receiver) = tokio::try_join!(
            self.fetch_required::<User>(USERS, sender_id, "user"),
            self.fetch_required::<User>(USERS, receiver_id, "user"),
        )?;
        if sender.friends.iter().any(|id| id == receiver_id) {
            return Err(Error::Validation("already friends".into()));
        }

        let key = FriendRequest::key(sender_id, receiver_id);
        let reverse_key = FriendRequest::key(receiver_id, sender_id);
        let (outgoing, incoming) = tokio::try_join!(
            self.fetch::<FriendRequest>(FRIEND_REQUESTS, &key),
            self.fetch::<FriendRequest>(FRIEND_REQUESTS, &reverse_key),
        )?;
        for existing in [&outgoing, &incoming].into_iter().flatten() {
            if existing.status == FriendRequestStatus::Pending {
                return Ok(existing.clone());
            }
        }

        let request = FriendRequest {
            id: key.clone(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            status: FriendRequestStatus::Pending,
            created_at: self.store.server_time(),
            responded_at: None,
        };
        let body = encode(&request)?;

        // The claim holds the pending request itself
        let pair = pair_key(sender_id, receiver_id);
        match self.store.create(PENDING_PAIRS, &pair, body.clone()).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                return self.fetch_required(PENDING_PAIRS, &pair, "friend request").await;
            }
            Err(e) => return Err(e.into()),
        }

        // Overwrites a settled request left over from an earlier round
        if let Err(e) = self.store.set(FRIEND_REQUESTS, &key, body).await {
            if let Err(cleanup) = self.release_pair(sender_id, receiver_id).await {
                warn!("Failed to release pending claim {}: {}", pair, cleanup);
            }
            return Err(e.into());
        }

        info!("Friend request {} -> {}", sender_id, receiver_id);
        self.fan_out(NotificationKind::FriendRequest, sender_id, receiver_id, None, None)
            .await;
        Ok(request)
    }

    /// Accept or reject a pending request. The caller passes the pair it
    /// believes the request belongs to; a mismatch is refused.
    pub async fn respond_to_friend_request(
        &self,
        request_id: &str,
        accept: bool,
        receiver_id: &str,
        sender_id: &str,
    ) -> Result<RelationshipState> {
        require(request_id, "request id")?;
        let request: FriendRequest = self
            .fetch_required(FRIEND_REQUESTS, request_id, "friend request")
            .await?;
        if request.receiver_id != receiver_id || request.sender_id != sender_id {
            return Err(Error::Forbidden("friend request belongs to another user".into()));
        }
        if request.status != FriendRequestStatus::Pending {
            return Err(Error::Validation("friend request is no longer pending".into()));
        }

        let state = if accept {
            self.store
                .update(
                    FRIEND_REQUESTS,
                    request_id,
                    vec![
                        FieldUpdate::set("status", serde_json::to_value(FriendRequestStatus::Accepted)?),
                        FieldUpdate::set(
                            "respondedAt",
                            timestamp::format(&self.store.server_time()),
                        ),
                    ],
                )
                .await?;
            tokio::try_join!(
                self.store.update(
                    USERS,
                    receiver_id,
                    vec![FieldUpdate::array_union("friends", sender_id)],
                ),
                self.store.update(
                    USERS,
                    sender_id,
                    vec![FieldUpdate::array_union("friends", receiver_id)],
                ),
            )?;
            self.release_pair(sender_id, receiver_id).await?;
            info!("Friend request {} accepted", request_id);
            RelationshipState::Friends
        } else {
            self.release_pair(sender_id, receiver_id).await?;
            self.store.delete(FRIEND_REQUESTS, request_id).await?;
            info!("Friend request {} rejected", request_id);
            RelationshipState::None
        };

        self.settle_request_notifications(sender_id, receiver_id).await;
        Ok(state)
    }

    /// Withdraw a pending request. Returns whether one was removed.
    pub async fn cancel_pending_request(&self, sender_id: &str, receiver_id: &str) -> Result<bool> {
        require(sender_id, "user id")?;
        require(receiver_id, "user id")?;
        let key = FriendRequest::key(sender_id, receiver_id);
        match self.fetch::<FriendRequest>(FRIEND_REQUESTS, &key).await? {
            Some(request) if request.status == FriendRequestStatus::Pending => {
                self.release_pair(sender_id, receiver_id).await?;
                self.store.delete(FRIEND_REQUESTS, &key).await?;
                info!("Friend request {} cancelled", key);
                self.settle_request_notifications(sender_id, receiver_id).await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_pair(&self, a: &str, b: &str) -> Result<()> {
        self.store.delete(PENDING_PAIRS, &pair_key(a, b)).await?;
        Ok(())
    }

    async fn settle_request_notifications(&self, sender_id: &str, receiver_id: &str) {
        if let Err(e) = self
            .settle_notifications(NotificationKind::FriendRequest, sender_id, receiver_id)
            .await
        {
            warn!("Failed to clear friend request notifications for {}: {}", receiver_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_ignores_direction() {
        assert_eq!(pair_key("b", "a"), "a_b");
        assert_eq!(pair_key("a", "b"), "a_b");
    }
}
