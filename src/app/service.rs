use std::sync::Arc;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::app::artifact_store::ArtifactStore;
use crate::app::job_store::JobStore;
use crate::app::model::{
    DEFAULT_OWNER, DEFAULT_TARGET_LANGUAGE, Job, JobPage, JobQuery, JobStats, JobStatus,
};
use crate::app::queue::InProcessQueue;
use crate::app::runner::JobRunner;
use crate::source::{is_supported_url, parse_work_url};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub language_to: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub url: String,
    pub job_id: Option<String>,
    pub work_id: Option<String>,
    pub duplicate: bool,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("no URLs provided")]
    NoUrls,

    #[error("unsupported URLs: {}", .0.join(", "))]
    InvalidUrls(Vec<String>),

    #[error("job queue is full; try again later")]
    QueueFull,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("job is {0}; it can be deleted once it completes or fails")]
    Unfinished(JobStatus),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Entry point shared by the HTTP app and the CLI.
pub struct JobService {
    job_store: Arc<dyn JobStore>,
    artifact_store: Arc<dyn ArtifactStore>,
    runner: Arc<JobRunner>,
    queue: InProcessQueue,
    // Serializes the duplicate check with record creation.
    submit_lock: Mutex<()>,
}

impl JobService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        artifact_store: Arc<dyn ArtifactStore>,
        runner: Arc<JobRunner>,
        queue: InProcessQueue,
    ) -> Self {
        Self {
            job_store,
            artifact_store,
            runner,
            queue,
            submit_lock: Mutex::new(()),
        }
    }

    pub fn artifact_store(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifact_store
    }

    /// Queues one job per new work. When the queue cannot take every new job
    /// the whole submission fails with [`SubmitError::QueueFull`] and nothing is
    /// created.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Vec<SubmitOutcome>, SubmitError> {
        let urls = request
            .urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();
        if urls.is_empty() {
            return Err(SubmitError::NoUrls);
        }
        let invalid = urls
            .iter()
            .filter(|u| !is_supported_url(u))
            .cloned()
            .collect::<Vec<_>>();
        if !invalid.is_empty() {
            return Err(SubmitError::InvalidUrls(invalid));
        }

        let owner = non_blank(request.owner).unwrap_or_else(|| DEFAULT_OWNER.to_owned());
        let language_to =
            non_blank(request.language_to).unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_owned());

        let _guard = self.submit_lock.lock().await;
        let mut outcomes = Vec::with_capacity(urls.len());
        let mut fresh: Vec<Job> = Vec::new();
        for url in urls {
            let work_id = match parse_work_url(&url) {
                Ok(work_id) => work_id,
                Err(err) => {
                    outcomes.push(SubmitOutcome {
                        url,
                        job_id: None,
                        work_id: None,
                        duplicate: false,
                        error: Some(err.to_string()),
                    });
                    continue;
                }
            };

            let existing = self
                .find_existing(&owner, work_id.as_str())
                .await?
                .or_else(|| {
                    fresh
                        .iter()
                        .find(|job| job.work_id == work_id.as_str())
                        .cloned()
                });
            if let Some(existing) = existing {
                tracing::info!(job_id = %existing.job_id, %work_id, "duplicate submission");
                outcomes.push(SubmitOutcome {
                    url,
                    job_id: Some(existing.job_id),
                    work_id: Some(existing.work_id),
                    duplicate: true,
                    error: None,
                });
                continue;
            }

            let job = Job::new_pending(owner.clone(), work_id.as_str(), url.clone(), &language_to);
            outcomes.push(SubmitOutcome {
                url,
                job_id: Some(job.job_id.clone()),
                work_id: Some(job.work_id.clone()),
                duplicate: false,
                error: None,
            });
            fresh.push(job);
        }

        // Every slot is reserved before any record exists.
        let slots = fresh
            .iter()
            .map(|_| self.queue.reserve())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SubmitError::QueueFull)?;

        for (slot, job) in slots.into_iter().zip(fresh) {
            if let Err(err) = self.job_store.create(&job).await {
                tracing::error!(job_id = %job.job_id, ?err, "failed to create job");
                for outcome in outcomes
                    .iter_mut()
                    .filter(|o| o.job_id.as_deref() == Some(job.job_id.as_str()))
                {
                    outcome.job_id = None;
                    outcome.duplicate = false;
                    outcome.error = Some(format!("{err:#}"));
                }
                continue;
            }
            tracing::info!(job_id = %job.job_id, work_id = %job.work_id, %language_to, "job queued");

            let runner = Arc::clone(&self.runner);
            let job_id = job.job_id;
            slot.spawn(async move {
                runner.run_job(&job_id).await;
            });
        }

        Ok(outcomes)
    }

    async fn find_existing(&self, owner: &str, work_id: &str) -> anyhow::Result<Option<Job>> {
        let jobs = self.job_store.list().await.context("list jobs")?;
        Ok(jobs
            .into_iter()
            .filter(|job| job.owner == owner && job.work_id == work_id)
            .max_by_key(|job| job.created_at))
    }

    pub async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        self.job_store.get(job_id).await
    }

    pub async fn list(&self, query: &JobQuery) -> anyhow::Result<JobPage> {
        let jobs = self.job_store.list().await.context("list jobs")?;
        Ok(query.apply(jobs))
    }

    pub async fn stats(&self, owner: Option<&str>) -> anyhow::Result<JobStats> {
        let jobs = self.job_store.list().await.context("list jobs")?;
        Ok(JobStats::collect(
            jobs.iter()
                .filter(|job| owner.is_none_or(|owner| job.owner == owner)),
        ))
    }

    /// Removes a finished job and every artifact it produced. Returns `false`
    /// if the job does not exist. Jobs still queued or running are refused.
    pub async fn delete(&self, job_id: &str) -> Result<bool, DeleteError> {
        let Some(job) = self.job_store.get(job_id).await? else {
            return Ok(false);
        };
        if !job.status.is_terminal() {
            return Err(DeleteError::Unfinished(job.status));
        }

        for key in [job.epub_key(), job.content_key(), job.snapshot_key()] {
            self.artifact_store
                .remove(&key)
                .await
                .with_context(|| format!("remove artifact: {key}"))?;
        }
        let removed = self.job_store.delete(job_id).await?;
        tracing::info!(job_id, "job deleted");
        Ok(removed)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
