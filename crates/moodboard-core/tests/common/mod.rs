#![allow(dead_code)]

use std::sync::Arc;

use argon2::Params;

use moodboard_auth::{IdentityStore, LocalIdentity};
use moodboard_core::MoodBoard;
use moodboard_db::{BlobStore, DocumentStore, MemoryBlobStore, MemoryStore, SqliteStore};
use moodboard_types::models::User;

pub const PASSWORD: &str = "correct horse";
pub const BLOB_BASE: &str = "http://localhost:3000/blobs";

pub struct Harness {
    pub board: MoodBoard,
    pub blobs: Arc<MemoryBlobStore>,
}

fn build(store: Arc<dyn DocumentStore>) -> Harness {
    let blobs = Arc::new(MemoryBlobStore::new(BLOB_BASE));
    let identity: Arc<dyn IdentityStore> = Arc::new(
        LocalIdentity::new(store.clone(), "test-secret")
            .with_params(Params::new(8, 1, 1, None).unwrap()),
    );
    let board = MoodBoard::new(store, blobs.clone() as Arc<dyn BlobStore>, identity);
    Harness { board, blobs }
}

pub fn harness() -> Harness {
    build(Arc::new(MemoryStore::new()))
}

pub fn sqlite_harness() -> Harness {
    build(Arc::new(SqliteStore::open_in_memory().unwrap()))
}

pub async fn user(board: &MoodBoard, handle: &str) -> User {
    let (_, user) = board
        .register(&format!("{handle}@example.com"), handle, PASSWORD)
        .await
        .unwrap();
    user
}
