mod common;

use moodboard_core::{Error, FRIEND_REQUESTS, PENDING_PAIRS};
use moodboard_types::api::RelationshipState;
use moodboard_types::models::{FriendRequest, FriendRequestStatus, NotificationKind};

use common::{harness, sqlite_harness, user};

#[tokio::test]
async fn send_then_accept_makes_mutual_friends() {
    let h = harness();
    let a = user(&h.board, "alice").await;
    let b = user(&h.board, "bob").await;

    assert_eq!(
        h.board.get_relationship_state(&a.id, &a.id).await.unwrap(),
        RelationshipState::Myself
    );
    assert_eq!(
        h.board.get_relationship_state(&a.id, &b.id).await.unwrap(),
        RelationshipState::None
    );

    let request = h.board.send_friend_request(&a.id, &b.id).await.unwrap();
    assert_eq!(request.id, FriendRequest::key(&a.id, &b.id));
    assert_eq!(request.status, FriendRequestStatus::Pending);
    assert_eq!(
        h.board.get_relationship_state(&a.id, &b.id).await.unwrap(),
        RelationshipState::Pending
    );
    assert_eq!(
        h.board.get_relationship_state(&b.id, &a.id).await.unwrap(),
        RelationshipState::Incoming
    );

    let unread = h.board.list_unread(&b.id, None).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].kind, NotificationKind::FriendRequest);
    assert_eq!(unread[0].content.as_deref(), Some("alice sent you a friend request"));

    let state = h
        .board
        .respond_to_friend_request(&request.id, true, &b.id, &a.id)
        .await
        .unwrap();
    assert_eq!(state, RelationshipState::Friends);

    assert!(h.board.get_user(&a.id).await.unwrap().friends.contains(&b.id));
    assert!(h.board.get_user(&b.id).await.unwrap().friends.contains(&a.id));
    assert_eq!(
        h.board.get_relationship_state(&a.id, &b.id).await.unwrap(),
        RelationshipState::Friends
    );
    assert_eq!(
        h.board.get_relationship_state(&b.id, &a.id).await.unwrap(),
        RelationshipState::Friends
    );

    // Responding settles the request notification
    assert!(h.board.list_unread(&b.id, None).await.unwrap().is_empty());

    let friends = h.board.list_friends(&a.id).await.unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].handle, "bob");
    assert_eq!(h.board.get_profile(&a.id).await.unwrap().friend_count, 1);
}

#[tokio::test]
async fn carol_rejects_dave() {
    let h = harness();
    let carol = user(&h.board, "carol").await;
    let dave = user(&h.board, "dave").await;

    let request = h.board.send_friend_request(&carol.id, &dave.id).await.unwrap();
    assert_eq!(
        h.board.get_relationship_state(&carol.id, &dave.id).await.unwrap(),
        RelationshipState::Pending
    );

    let state = h
        .board
        .respond_to_friend_request(&request.id, false, &dave.id, &carol.id)
        .await
        .unwrap();
    assert_eq!(state, RelationshipState::None);
    assert_eq!(
        h.board.get_relationship_state(&carol.id, &dave.id).await.unwrap(),
        RelationshipState::None
    );
    assert!(h.board.store().get(FRIEND_REQUESTS, &request.id).await.unwrap().is_none());

    // A new cycle may start
    h.board.send_friend_request(&carol.id, &dave.id).await.unwrap();
    assert_eq!(
        h.board.get_relationship_state(&carol.id, &dave.id).await.unwrap(),
        RelationshipState::Pending
    );
}

#[tokio::test]
async fn sending_twice_is_a_no_op() {
    let h = harness();
    let a = user(&h.board, "alice").await;
    let b = user(&h.board, "bob").await;

    let first = h.board.send_friend_request(&a.id, &b.id).await.unwrap();
    let again = h.board.send_friend_request(&a.id, &b.id).await.unwrap();
    assert_eq!(first, again);

    // The reverse direction finds the same pending request
    let reverse = h.board.send_friend_request(&b.id, &a.id).await.unwrap();
    assert_eq!(reverse.id, first.id);

    assert_eq!(h.board.list_unread(&b.id, None).await.unwrap().len(), 1);
    assert!(h.board.list_unread(&a.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn crossing_requests_settle_on_one() {
    for _ in 0..10 {
        let h = sqlite_harness();
        let a = user(&h.board, "alice").await;
        let b = user(&h.board, "bob").await;

        let (forward, backward) = tokio::join!(
            h.board.send_friend_request(&a.id, &b.id),
            h.board.send_friend_request(&b.id, &a.id),
        );
        let (forward, backward) = (forward.unwrap(), backward.unwrap());
        assert_eq!(forward.id, backward.id);

        let sent_to_a = h.board.list_unread(&a.id, None).await.unwrap().len();
        let sent_to_b = h.board.list_unread(&b.id, None).await.unwrap().len();
        assert_eq!(sent_to_a + sent_to_b, 1);

        let states = (
            h.board.get_relationship_state(&a.id, &b.id).await.unwrap(),
            h.board.get_relationship_state(&b.id, &a.id).await.unwrap(),
        );
        assert!(matches!(
            states,
            (RelationshipState::Pending, RelationshipState::Incoming)
                | (RelationshipState::Incoming, RelationshipState::Pending)
        ));
    }
}

#[tokio::test]
async fn settling_a_request_frees_the_pair() {
    let h = harness();
    let a = user(&h.board, "alice").await;
    let b = user(&h.board, "bob").await;
    let pair = if a.id <= b.id {
        format!("{}_{}", a.id, b.id)
    } else {
        format!("{}_{}", b.id, a.id)
    };

    let request = h.board.send_friend_request(&a.id, &b.id).await.unwrap();
    assert!(h.board.store().get(PENDING_PAIRS, &pair).await.unwrap().is_some());
    h.board
        .respond_to_friend_request(&request.id, false, &b.id, &a.id)
        .await
        .unwrap();
    assert!(h.board.store().get(PENDING_PAIRS, &pair).await.unwrap().is_none());

    // Either side may open the next round
    let request = h.board.send_friend_request(&b.id, &a.id).await.unwrap();
    assert_eq!(request.sender_id, b.id);
    assert!(h.board.cancel_pending_request(&b.id, &a.id).await.unwrap());
    assert!(h.board.store().get(PENDING_PAIRS, &pair).await.unwrap().is_none());

    let request = h.board.send_friend_request(&a.id, &b.id).await.unwrap();
    h.board
        .respond_to_friend_request(&request.id, true, &b.id, &a.id)
        .await
        .unwrap();
    assert!(h.board.store().get(PENDING_PAIRS, &pair).await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_requests() {
    let h = harness();
    let a = user(&h.board, "alice").await;
    let b = user(&h.board, "bob").await;

    let err = h.board.send_friend_request(&a.id, &a.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = h.board.send_friend_request(&a.id, "nobody").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let request = h.board.send_friend_request(&a.id, &b.id).await.unwrap();
    // Only the receiver may answer
    let err = h
        .board
        .respond_to_friend_request(&request.id, true, &a.id, &b.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    h.board
        .respond_to_friend_request(&request.id, true, &b.id, &a.id)
        .await
        .unwrap();
    let err = h
        .board
        .respond_to_friend_request(&request.id, true, &b.id, &a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = h.board.send_friend_request(&a.id, &b.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn cancelling_returns_to_none() {
    let h = harness();
    let a = user(&h.board, "alice").await;
    let b = user(&h.board, "bob").await;

    h.board.send_friend_request(&a.id, &b.id).await.unwrap();
    assert!(h.board.cancel_pending_request(&a.id, &b.id).await.unwrap());
    assert!(!h.board.cancel_pending_request(&a.id, &b.id).await.unwrap());

    assert_eq!(
        h.board.get_relationship_state(&a.id, &b.id).await.unwrap(),
        RelationshipState::None
    );
    assert!(h.board.list_unread(&b.id, None).await.unwrap().is_empty());
}
