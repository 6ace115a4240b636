mod common;

use std::collections::HashSet;

use moodboard_core::Error;
use moodboard_types::models::{Emotion, NotificationKind};

use common::{harness, sqlite_harness, user};

#[tokio::test]
async fn pages_walk_the_feed_newest_first() {
    let h = harness();
    let alice = user(&h.board, "alice").await;
    for i in 0..25 {
        h.board
            .create_post(&alice.id, &format!("post {i}"), Emotion::Happy)
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor = None;
    let mut sizes = Vec::new();
    loop {
        let page = h
            .board
            .get_feed_page(&alice.id, cursor.as_deref(), Some(10))
            .await
            .unwrap();
        sizes.push(page.posts.len());
        seen.extend(page.posts);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(seen.len(), 25);
    assert!(seen.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    let ids: HashSet<_> = seen.iter().map(|p| p.id.clone()).collect();
    assert_eq!(ids.len(), 25);
    assert_eq!(seen[0].content, "post 24");
    assert_eq!(seen[24].content, "post 0");
}

#[tokio::test]
async fn full_last_page_is_followed_by_an_empty_one() {
    let h = harness();
    let alice = user(&h.board, "alice").await;
    for i in 0..4 {
        h.board
            .create_post(&alice.id, &format!("post {i}"), Emotion::Sad)
            .await
            .unwrap();
    }

    let first = h.board.get_feed_page(&alice.id, None, Some(2)).await.unwrap();
    let second = h
        .board
        .get_feed_page(&alice.id, first.next_cursor.as_deref(), Some(2))
        .await
        .unwrap();
    assert_eq!(second.posts.len(), 2);
    let third = h
        .board
        .get_feed_page(&alice.id, second.next_cursor.as_deref(), Some(2))
        .await
        .unwrap();
    assert!(third.posts.is_empty());
    assert!(third.next_cursor.is_none());
}

#[tokio::test]
async fn deleting_the_last_post_on_a_page_keeps_paging() {
    for h in [harness(), sqlite_harness()] {
        let alice = user(&h.board, "alice").await;
        for i in 0..4 {
            h.board
                .create_post(&alice.id, &format!("post {i}"), Emotion::Cool)
                .await
                .unwrap();
        }

        let first = h.board.get_feed_page(&alice.id, None, Some(2)).await.unwrap();
        let last_seen = &first.posts[1];
        h.board.delete_post(&last_seen.id, &alice.id).await.unwrap();

        let second = h
            .board
            .get_feed_page(&alice.id, first.next_cursor.as_deref(), Some(2))
            .await
            .unwrap();
        let contents: Vec<_> = second.posts.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, ["post 1", "post 0"]);
    }
}

#[tokio::test]
async fn rejects_a_garbled_cursor() {
    let h = harness();
    let alice = user(&h.board, "alice").await;
    let err = h
        .board
        .get_feed_page(&alice.id, Some("definitely not a cursor"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn rejects_zero_page_size() {
    let h = harness();
    let alice = user(&h.board, "alice").await;
    let err = h.board.get_feed_page(&alice.id, None, Some(0)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

async fn alice_and_bob(h: common::Harness) {
    let alice = user(&h.board, "alice").await;
    let bob = user(&h.board, "bob").await;

    h.board
        .create_post(&alice.id, "feeling great", Emotion::Happy)
        .await
        .unwrap();

    let page = h.board.get_feed_page(&bob.id, None, None).await.unwrap();
    let post = page
        .posts
        .iter()
        .find(|p| p.content == "feeling great")
        .unwrap()
        .clone();
    assert_eq!(post.emotion, Emotion::Happy);
    assert_eq!(post.author_handle, "alice");
    assert_eq!(post.like_count, 0);
    assert_eq!(post.comment_count, 0);
    assert!(!post.is_liked);

    let state = h.board.toggle_like(&post.id, &bob.id, false).await.unwrap();
    assert!(state.liked);
    assert_eq!(state.like_count, 1);

    let unread = h.board.list_unread(&alice.id, None).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].kind, NotificationKind::Like);
    assert_eq!(unread[0].sender_handle, "bob");
    assert_eq!(unread[0].post_id.as_deref(), Some(post.id.as_str()));
    assert_eq!(unread[0].content.as_deref(), Some("bob liked your post"));

    let page = h.board.get_feed_page(&bob.id, None, None).await.unwrap();
    assert!(page.posts[0].is_liked);
    assert_eq!(page.posts[0].like_count, 1);
}

#[tokio::test]
async fn alice_posts_and_bob_likes() {
    alice_and_bob(harness()).await;
}

#[tokio::test]
async fn alice_posts_and_bob_likes_on_sqlite() {
    alice_and_bob(sqlite_harness()).await;
}

#[tokio::test]
async fn missing_author_shows_placeholder() {
    let h = harness();
    let alice = user(&h.board, "alice").await;
    h.board
        .create_post(&alice.id, "still here", Emotion::Cool)
        .await
        .unwrap();
    h.board.store().delete(moodboard_core::USERS, &alice.id).await.unwrap();

    let page = h.board.get_feed_page("someone", None, None).await.unwrap();
    assert_eq!(page.posts[0].author_handle, "Anonymous");
    assert!(page.posts[0].author_avatar_url.is_none());
}
