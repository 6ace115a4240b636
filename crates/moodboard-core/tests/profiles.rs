mod common;

use moodboard_auth::AuthError;
use moodboard_core::{AvatarUpload, Error, HANDLES, ProfileUpdate};
use moodboard_types::models::Emotion;

use common::{BLOB_BASE, PASSWORD, harness, sqlite_harness, user};

#[tokio::test]
async fn register_and_sign_in_by_handle() {
    let h = harness();
    let (session, alice) = h
        .board
        .register("Alice@Example.com", "alice", PASSWORD)
        .await
        .unwrap();
    assert_eq!(alice.email, "alice@example.com");
    assert_eq!(session.principal.id, alice.id);
    assert_eq!(h.board.authenticate(&session.token).await.unwrap().id, alice.id);

    let (again, user) = h.board.sign_in("alice", PASSWORD).await.unwrap();
    assert_eq!(user.id, alice.id);
    assert!(h.board.authenticate(&again.token).await.is_ok());

    // Handle lookup ignores case
    assert!(h.board.sign_in("ALICE", PASSWORD).await.is_ok());
}

#[tokio::test]
async fn sign_in_failures() {
    let h = harness();
    user(&h.board, "alice").await;

    let err = h.board.sign_in("nobody", PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::UnknownUser)));
    let err = h.board.sign_in("alice", "wrong password").await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
    let err = h.board.sign_in("", PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn sign_out_revokes_the_token() {
    let h = harness();
    let (session, alice) = h
        .board
        .register("alice@example.com", "alice", PASSWORD)
        .await
        .unwrap();

    h.board.sign_out(&alice.id).await.unwrap();
    let err = h.board.authenticate(&session.token).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::InvalidToken)));
}

#[tokio::test]
async fn handles_and_emails_are_unique() {
    let h = harness();
    user(&h.board, "alice").await;

    let err = h
        .board
        .register("other@example.com", "Alice", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::HandleTaken)));

    let err = h
        .board
        .register("alice@example.com", "alice2", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::EmailTaken)));

    let err = h
        .board
        .register("x@example.com", "no spaces", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn failed_sign_up_releases_the_handle() {
    let h = harness();
    user(&h.board, "alice").await;

    let err = h
        .board
        .register("alice@example.com", "bob", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::EmailTaken)));
    assert!(h.board.store().get(HANDLES, "bob").await.unwrap().is_none());

    let (_, bob) = h
        .board
        .register("bob@example.com", "bob", PASSWORD)
        .await
        .unwrap();
    assert_eq!(bob.handle, "bob");
    let (_, signed_in) = h.board.sign_in("bob", PASSWORD).await.unwrap();
    assert_eq!(signed_in.id, bob.id);
}

#[tokio::test]
async fn racing_registrations_leave_one_account() {
    let h = sqlite_harness();
    let (first, second) = tokio::join!(
        h.board.register("one@example.com", "shared", PASSWORD),
        h.board.register("two@example.com", "shared", PASSWORD),
    );
    let (winner, loser_email) = match (first, second) {
        (Ok((_, user)), Err(err)) => {
            assert!(matches!(err, Error::Auth(AuthError::HandleTaken)));
            (user, "two@example.com")
        }
        (Err(err), Ok((_, user))) => {
            assert!(matches!(err, Error::Auth(AuthError::HandleTaken)));
            (user, "one@example.com")
        }
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(winner.handle, "shared");

    // The losing email never got an account, so it can still register
    h.board.register(loser_email, "other", PASSWORD).await.unwrap();
}

#[tokio::test]
async fn avatar_is_uploaded_and_linked() {
    let h = harness();
    let alice = user(&h.board, "alice").await;

    let profile = h
        .board
        .update_profile(
            &alice.id,
            ProfileUpdate {
                bio: Some("  hello there ".into()),
                avatar: Some(AvatarUpload {
                    bytes: vec![0x89, b'P', b'N', b'G'],
                    content_type: "image/png".into(),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let path = format!("avatars/{}.png", alice.id);
    assert_eq!(h.blobs.get(&path).unwrap(), vec![0x89, b'P', b'N', b'G']);
    let url = profile.avatar_url.unwrap();
    assert!(url.starts_with(&format!("{BLOB_BASE}/{path}?v=")));
    assert_eq!(profile.bio.as_deref(), Some("hello there"));

    // The avatar flows into post views
    h.board.create_post(&alice.id, "new look", Emotion::Cool).await.unwrap();
    let page = h.board.get_feed_page(&alice.id, None, None).await.unwrap();
    assert_eq!(page.posts[0].author_avatar_url.as_deref(), Some(url.as_str()));

    let cleared = h
        .board
        .update_profile(
            &alice.id,
            ProfileUpdate {
                bio: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.bio.is_none());
}

#[tokio::test]
async fn bad_avatars_write_nothing() {
    let h = harness();
    let alice = user(&h.board, "alice").await;

    for (bytes, content_type) in [
        (vec![1, 2, 3], "image/svg+xml"),
        (Vec::new(), "image/png"),
        (vec![0; 2 * 1024 * 1024 + 1], "image/png"),
    ] {
        let err = h
            .board
            .update_profile(
                &alice.id,
                ProfileUpdate {
                    handle: Some("renamed".into()),
                    avatar: Some(AvatarUpload {
                        bytes,
                        content_type: content_type.into(),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    assert!(h.blobs.get(&format!("avatars/{}.png", alice.id)).is_none());
    assert_eq!(h.board.get_profile(&alice.id).await.unwrap().handle, "alice");
}

#[tokio::test]
async fn renaming_frees_the_old_handle() {
    let h = harness();
    let alice = user(&h.board, "alice").await;
    user(&h.board, "bob").await;

    let err = h
        .board
        .update_profile(
            &alice.id,
            ProfileUpdate {
                handle: Some("bob".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::HandleTaken)));

    let profile = h
        .board
        .update_profile(
            &alice.id,
            ProfileUpdate {
                handle: Some("ally".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(profile.handle, "ally");

    assert!(h.board.sign_in("ally", PASSWORD).await.is_ok());
    // Someone else can now take "alice"
    h.board
        .register("newcomer@example.com", "alice", PASSWORD)
        .await
        .unwrap();
}
