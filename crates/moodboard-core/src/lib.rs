//! Data-access layer for MoodBoard.
//!
//! [`MoodBoard`] wraps the three collaborators (documents, blobs, identity)
//! and exposes every read and mutation the presentation layer needs.
//! Operations are spread across modules as separate `impl MoodBoard` blocks.

mod collections;
pub mod engagement;
pub mod error;
pub mod feed;
pub mod notifications;
pub mod posts;
pub mod profiles;
pub mod relationships;
pub mod search;
pub mod watcher;

use std::sync::Arc;

use moodboard_auth::IdentityStore;
use moodboard_db::{BlobStore, DocumentStore};

pub use collections::{
    COMMENTS, FRIEND_REQUESTS, HANDLES, LIKES, NOTIFICATIONS, PENDING_PAIRS, POSTS, USERS,
};
pub use error::{Error, Result};
pub use profiles::{AvatarUpload, ProfileUpdate};
pub use watcher::NotificationWatcher;

#[derive(Clone)]
pub struct MoodBoard {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    identity: Arc<dyn IdentityStore>,
}

impl MoodBoard {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            store,
            blobs,
            identity,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn identity(&self) -> &Arc<dyn IdentityStore> {
        &self.identity
    }
}
