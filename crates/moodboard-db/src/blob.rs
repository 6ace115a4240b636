//! Object storage for user uploads (avatars).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Reference to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any previous object there.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> StoreResult<BlobHandle>;

    /// Public URL for a stored object. The content hash is appended so a
    /// replaced avatar gets a fresh URL.
    fn url(&self, handle: &BlobHandle) -> String;
}

fn check_path(path: &str) -> StoreResult<()> {
    let valid = !path.is_empty()
        && path.split('/').all(|part| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        });
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!("bad blob path: {path:?}")))
    }
}

fn handle_for(path: &str, bytes: &[u8]) -> BlobHandle {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    BlobHandle {
        path: path.to_string(),
        sha256: hex::encode(hasher.finalize()),
        size: bytes.len() as u64,
    }
}

fn versioned_url(base: &str, handle: &BlobHandle) -> String {
    let version = &handle.sha256[..handle.sha256.len().min(12)];
    format!("{}/{}?v={}", base.trim_end_matches('/'), handle.path, version)
}

/// Stores each object as a flat file at `{root}/{path}`.
pub struct DiskBlobStore {
    root: PathBuf,
    public_base: String,
}

impl DiskBlobStore {
    pub async fn new(root: PathBuf, public_base: impl Into<String>) -> StoreResult<Self> {
        fs::create_dir_all(&root).await?;
        info!("Blob storage directory: {}", root.display());
        Ok(Self {
            root,
            public_base: public_base.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the file for a given object.
    pub fn file_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    pub async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        check_path(path)?;
        match fs::read(self.file_path(path)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::not_found("blobs", path))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> StoreResult<BlobHandle> {
        check_path(path)?;
        let target = self.file_path(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&target).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        let handle = handle_for(path, &bytes);
        info!("Stored blob {} ({} bytes)", path, handle.size);
        Ok(handle)
    }

    fn url(&self, handle: &BlobHandle) -> String {
        versioned_url(&self.public_base, handle)
    }
}

/// In-memory object store for tests.
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    public_base: String,
}

impl MemoryBlobStore {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            public_base: public_base.into(),
        }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().ok()?.get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> StoreResult<BlobHandle> {
        check_path(path)?;
        let handle = handle_for(path, &bytes);
        self.objects
            .write()
            .map_err(|e| StoreError::Unavailable(format!("blob store lock poisoned: {e}")))?
            .insert(path.to_string(), bytes);
        Ok(handle)
    }

    fn url(&self, handle: &BlobHandle) -> String {
        versioned_url(&self.public_base, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_store_writes_and_versions_urls() {
        let dir = std::env::temp_dir().join(format!("moodboard_blobs_{}", uuid::Uuid::new_v4()));
        let store = DiskBlobStore::new(dir.clone(), "http://localhost:3000/blobs/")
            .await
            .unwrap();

        let first = store.upload("avatars/u1.png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(first.size, 3);
        assert_eq!(store.read("avatars/u1.png").await.unwrap(), vec![1, 2, 3]);

        let second = store.upload("avatars/u1.png", vec![4, 5]).await.unwrap();
        assert_ne!(store.url(&first), store.url(&second));
        assert!(store.url(&second).starts_with("http://localhost:3000/blobs/avatars/u1.png?v="));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let store = MemoryBlobStore::new("http://x");
        for bad in ["../etc/passwd", "avatars//x", "", "a/./b"] {
            assert!(store.upload(bad, vec![0]).await.is_err(), "{bad} accepted");
        }
    }
}
