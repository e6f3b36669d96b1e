//! Local directory store for development; files are served under `/uploads`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::instrument;

use super::{BlobStore, ImageKind, StorageError};

/// URL prefix the router serves the directory under.
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path { &self.dir }
}

#[async_trait]
impl BlobStore for LocalStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, key: &str, _kind: ImageKind, bytes: Vec<u8>) -> Result<String, StorageError> {
        if key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(StorageError::Multipart(format!("invalid key {key}")));
        }
        let path = self.dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("{PUBLIC_PREFIX}/{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_writes_file() {
        let dir = std::env::temp_dir().join(format!("atelier-uploads-{}", uuid::Uuid::new_v4()));
        let store = LocalStore::new(&dir);
        let url = store.put("user/a.gif", ImageKind::Gif, b"GIF89a".to_vec()).await.unwrap();
        assert_eq!(url, "/uploads/user/a.gif");
        assert_eq!(tokio::fs::read(dir.join("user/a.gif")).await.unwrap(), b"GIF89a");
        assert!(store.put("../escape.gif", ImageKind::Gif, vec![]).await.is_err());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
