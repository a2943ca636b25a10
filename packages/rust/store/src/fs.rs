//! Local-directory object store, used for local runs and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use lessonvault_shared::{LessonVaultError, Result};

use crate::{ObjectMeta, ObjectStore};

/// Object store backed by a directory tree under `root`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Atomic write: temp file in the target directory, then rename.
    async fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LessonVaultError::io(parent, e))?;
        }
        let tmp = dest.with_extension("part");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| LessonVaultError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, dest)
            .await
            .map_err(|e| LessonVaultError::io(dest, e))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let dest = self.resolve(path);
        self.write_atomic(&dest, bytes).await?;
        debug!(path, bytes = bytes.len(), "stored object");
        Ok(())
    }

    async fn put_file(&self, path: &str, local: &Path) -> Result<u64> {
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|e| LessonVaultError::io(local, e))?;
        let size = bytes.len() as u64;
        self.put(path, &bytes).await?;
        Ok(size)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let src = self.resolve(path);
        tokio::fs::read(&src)
            .await
            .map_err(|e| LessonVaultError::io(&src, e))
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        match tokio::fs::metadata(self.resolve(path)).await {
            Ok(meta) => Ok(Some(ObjectMeta { size: meta.len() })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LessonVaultError::Storage(format!("{path}: {e}"))),
        }
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LessonVaultError::Storage(format!("store root unavailable: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (FsObjectStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("lv-fsstore-{}", uuid::Uuid::now_v7()));
        (FsObjectStore::new(&root), root)
    }

    #[tokio::test]
    async fn put_get_head_roundtrip() {
        let (store, root) = temp_store();

        store.put("captions/raw/v1", b"WEBVTT").await.unwrap();
        assert_eq!(store.get("captions/raw/v1").await.unwrap(), b"WEBVTT");
        assert_eq!(
            store.head("captions/raw/v1").await.unwrap(),
            Some(ObjectMeta { size: 6 })
        );
        assert_eq!(store.head("captions/raw/v2").await.unwrap(), None);

        // No temp artifact left behind.
        assert!(!root.join("captions/raw/v1.part").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn put_file_reports_size() {
        let (store, root) = temp_store();
        store.ping().await.unwrap();

        let local = root.join("staged.bin");
        std::fs::write(&local, vec![0u8; 1024]).unwrap();

        let size = store.put_file("media/v1", &local).await.unwrap();
        assert_eq!(size, 1024);
        assert_eq!(
            store.head("media/v1").await.unwrap(),
            Some(ObjectMeta { size: 1024 })
        );
        let _ = std::fs::remove_dir_all(&root);
    }
}
