use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

use crate::app::model::Job;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> anyhow::Result<()>;
    async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>>;
    async fn put(&self, job: &Job) -> anyhow::Result<()>;
    async fn list(&self) -> anyhow::Result<Vec<Job>>;
    /// Returns whether a record was removed.
    async fn delete(&self, job_id: &str) -> anyhow::Result<bool>;
}

/// One `jobs/<job_id>.json` file per job under `base_dir`.
#[derive(Debug, Clone)]
pub struct LocalFsJobStore {
    base_dir: PathBuf,
}

impl LocalFsJobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn jobs_dir(&self) -> PathBuf {
        self.base_dir.join("jobs")
    }

    fn job_json_path(&self, job_id: &str) -> anyhow::Result<PathBuf> {
        validate_job_id(job_id)?;
        Ok(self.jobs_dir().join(format!("{job_id}.json")))
    }
}

#[async_trait]
impl JobStore for LocalFsJobStore {
    async fn create(&self, job: &Job) -> anyhow::Result<()> {
        let path = self.job_json_path(&job.job_id)?;
        if fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))?
        {
            anyhow::bail!("job already exists: {}", job.job_id);
        }
        write_json_atomic(&path, job)
            .await
            .context("write job json")
    }

    async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        let path = self.job_json_path(job_id)?;
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put(&self, job: &Job) -> anyhow::Result<()> {
        let path = self.job_json_path(&job.job_id)?;
        write_json_atomic(&path, job)
            .await
            .context("write job json")
    }

    async fn list(&self) -> anyhow::Result<Vec<Job>> {
        let dir = self.jobs_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read dir: {}", dir.display()));
            }
        };

        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("read dir entry: {}", dir.display()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Job>(&path).await {
                Ok(Some(job)) => jobs.push(job),
                // Deleted between read_dir and read.
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), ?err, "skipping unreadable job record");
                }
            }
        }
        Ok(jobs)
    }

    async fn delete(&self, job_id: &str) -> anyhow::Result<bool> {
        let path = self.job_json_path(job_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("remove: {}", path.display())),
        }
    }
}

fn validate_job_id(job_id: &str) -> anyhow::Result<()> {
    let ok = !job_id.is_empty()
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !ok {
        anyhow::bail!("invalid job id: {job_id:?}");
    }
    Ok(())
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    write_bytes_atomic(path, &data).await
}

/// Writes to a sibling temp file, then renames it over `path`.
pub(crate) async fn write_bytes_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", path.display()))?;
    let tmp_path = parent.join(format!(
        ".{file_name}.tmp.{}",
        uuid::Uuid::new_v4().simple()
    ));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::model::JobStatus;

    #[tokio::test]
    async fn create_get_put_list_delete() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalFsJobStore::new(temp.path());

        assert!(store.list().await?.is_empty());

        let mut job = Job::new_pending("local", "123", "https://archiveofourown.org/works/123", "pt");
        store.create(&job).await?;
        assert!(store.create(&job).await.is_err());

        job.transition(JobStatus::Scraping)?;
        store.put(&job).await?;
        let loaded = store.get(&job.job_id).await?.expect("job exists");
        assert_eq!(loaded.status, JobStatus::Scraping);

        let other = Job::new_pending("local", "456", "https://archiveofourown.org/works/456", "es");
        store.create(&other).await?;
        assert_eq!(store.list().await?.len(), 2);

        assert!(store.delete(&job.job_id).await?);
        assert!(!store.delete(&job.job_id).await?);
        assert!(store.get(&job.job_id).await?.is_none());
        assert_eq!(store.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_path_like_job_ids() {
        let temp = tempfile::tempdir().unwrap();
        let store = LocalFsJobStore::new(temp.path());
        assert!(store.get("../escape").await.is_err());
        assert!(store.delete("").await.is_err());
    }

    #[tokio::test]
    async fn list_ignores_temp_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalFsJobStore::new(temp.path());
        let job = Job::new_pending("local", "1", "https://archiveofourown.org/works/1", "pt");
        store.create(&job).await?;
        std::fs::write(temp.path().join("jobs").join(".x.json.tmp.abc"), b"{")?;

        assert_eq!(store.list().await?.len(), 1);
        Ok(())
    }
}
