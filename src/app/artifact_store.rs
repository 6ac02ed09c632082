use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

use crate::app::job_store::write_bytes_atomic;

pub const EPUB_CONTENT_TYPE: &str = "application/epub+zip";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Blob storage addressed by relative keys such as `local/<job_id>.epub`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    /// Returns whether a blob was removed.
    async fn remove(&self, key: &str) -> anyhow::Result<bool>;
    /// Filesystem path backing `key`, for streaming downloads.
    fn local_path(&self, key: &str) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct LocalFsArtifactStore {
    base_dir: PathBuf,
}

impl LocalFsArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn artifacts_dir(&self) -> PathBuf {
        self.base_dir.join("artifacts")
    }

    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        let safe = !key.is_empty()
            && rel
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            anyhow::bail!("invalid artifact key: {key:?}");
        }
        Ok(self.artifacts_dir().join(rel))
    }
}

#[async_trait]
impl ArtifactStore for LocalFsArtifactStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        tracing::debug!(key, content_type, bytes = bytes.len(), "store artifact");
        write_bytes_atomic(&path, &bytes)
            .await
            .with_context(|| format!("write artifact: {key}"))
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read: {}", path.display())),
        }
    }

    async fn remove(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("remove: {}", path.display())),
        }
    }

    fn local_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        self.resolve(key)
    }
}
