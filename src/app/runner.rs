use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;

use crate::app::artifact_store::{ArtifactStore, EPUB_CONTENT_TYPE, JSON_CONTENT_TYPE};
use crate::app::job_store::JobStore;
use crate::app::model::{Job, JobStatus};
use crate::config::PipelineConfig;
use crate::content::ReaderContent;
use crate::epub::{EpubBook, EpubChapter, build_epub};
use crate::error::PipelineError;
use crate::scrape::{ExtractedWork, WorkScraper};
use crate::source::parse_work_url;
use crate::translate::{BatchCoordinator, Translator};

/// Runs one job through scrape, translate, and assemble, persisting every
/// state change to the job store.
pub struct JobRunner {
    job_store: Arc<dyn JobStore>,
    artifact_store: Arc<dyn ArtifactStore>,
    scraper: WorkScraper,
    translator: Arc<Translator>,
    batch_size: usize,
}

impl JobRunner {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        artifact_store: Arc<dyn ArtifactStore>,
        scraper: WorkScraper,
        translator: Arc<Translator>,
        batch_size: usize,
    ) -> Self {
        Self {
            job_store,
            artifact_store,
            scraper,
            translator,
            batch_size: batch_size.max(1),
        }
    }

    /// Builds the scraper and the provider chain from `config`.
    pub fn from_config(
        job_store: Arc<dyn JobStore>,
        artifact_store: Arc<dyn ArtifactStore>,
        config: &PipelineConfig,
    ) -> anyhow::Result<Self> {
        let scraper = WorkScraper::new(config.source_base_url.clone()).context("build scraper")?;
        let translator = config.translator.build_translator()?;
        Ok(Self::new(
            job_store,
            artifact_store,
            scraper,
            Arc::new(translator),
            config.batch_size,
        ))
    }

    pub async fn run_job(&self, job_id: &str) {
        tracing::info!(job_id, "job started");
        match self.try_run_job(job_id).await {
            Ok(job) => {
                tracing::info!(
                    job_id,
                    work_id = %job.work_id,
                    paragraphs = job.total_paragraphs,
                    words = job.word_count,
                    "job completed"
                );
            }
            Err(err) => {
                tracing::error!(
                    job_id,
                    kind = ?err.kind(),
                    transient = err.is_transient(),
                    error = %err,
                    "job failed"
                );
                if let Err(mark_err) = self.mark_error(job_id, err.to_string()).await {
                    tracing::error!(job_id, ?mark_err, "failed to record job error");
                }
            }
        }
    }

    async fn try_run_job(&self, job_id: &str) -> Result<Job, PipelineError> {
        let mut job = self
            .job_store
            .get(job_id)
            .await
            .map_err(PipelineError::storage("load job"))?
            .ok_or_else(|| {
                PipelineError::storage("load job")(anyhow::anyhow!("job not found: {job_id}"))
            })?;

        job.transition(JobStatus::Scraping)?;
        self.save(&job).await?;

        let work_id = parse_work_url(&job.url)?;
        let work = self.scraper.fetch_work(&work_id).await?;
        tracing::info!(
            job_id,
            work_id = %work.work_id,
            blocks = work.blocks.len(),
            language = %work.language,
            "work scraped"
        );

        job.title_original = Some(work.title.clone());
        job.author = Some(work.author.clone());
        job.language_from = Some(work.language.clone());
        job.total_paragraphs = work.blocks.len();
        job.translated_paragraphs = 0;
        job.transition(JobStatus::Translating)?;
        self.save(&job).await?;

        self.upload_snapshot(&job, &work).await?;

        let translated = self.translate_blocks(&mut job, &work).await?;
        let title_translated = self
            .translator
            .translate(&work.title, &work.language, &job.language_to)
            .await?;

        let epub = build_epub(&EpubBook {
            title: title_translated.clone(),
            title_original: work.title.clone(),
            author: work.author.clone(),
            source_url: work.url.clone(),
            lang: job.language_to.clone(),
            modified: Utc::now(),
            chapters: vec![EpubChapter {
                title: Some(title_translated.clone()),
                body_html: translated.join("\n"),
            }],
        })
        .map_err(PipelineError::Assemble)?;

        let content = ReaderContent::single_chapter(
            &title_translated,
            &work.title,
            &work.author,
            &work.url,
            &translated,
        );
        let content_json = serde_json::to_vec(&content)
            .map_err(|err| PipelineError::storage("serialize reader content")(err.into()))?;

        let epub_key = job.epub_key();
        let content_key = job.content_key();
        self.artifact_store
            .put(&epub_key, epub, EPUB_CONTENT_TYPE)
            .await
            .map_err(PipelineError::storage("upload epub"))?;
        self.artifact_store
            .put(&content_key, content_json, JSON_CONTENT_TYPE)
            .await
            .map_err(PipelineError::storage("upload reader content"))?;

        self.remove_snapshot(&job).await;

        job.title_translated = Some(title_translated);
        job.word_count = content.metadata.word_count;
        job.translated_paragraphs = job.total_paragraphs;
        job.progress = 100;
        job.epub_path = Some(epub_key);
        job.content_path = Some(content_key);
        job.transition(JobStatus::Completed)?;
        self.save(&job).await?;

        Ok(job)
    }

    async fn translate_blocks(
        &self,
        job: &mut Job,
        work: &ExtractedWork,
    ) -> Result<Vec<String>, PipelineError> {
        let mut coordinator = BatchCoordinator::new(work.blocks.clone(), self.batch_size)?;
        while let Some(progress) = coordinator
            .next_batch(&self.translator, &work.language, &job.language_to)
            .await?
        {
            job.translated_paragraphs = progress.translated;
            job.progress = job.progress.max(progress.percent);
            job.touch();
            self.save(job).await?;
            tracing::info!(
                job_id = %job.job_id,
                translated = progress.translated,
                total = progress.total,
                progress = job.progress,
                "translation progress"
            );
        }
        Ok(coordinator.into_translated())
    }

    async fn upload_snapshot(&self, job: &Job, work: &ExtractedWork) -> Result<(), PipelineError> {
        let snapshot = serde_json::to_vec_pretty(work)
            .map_err(|err| PipelineError::storage("serialize snapshot")(err.into()))?;
        self.artifact_store
            .put(&job.snapshot_key(), snapshot, JSON_CONTENT_TYPE)
            .await
            .map_err(PipelineError::storage("upload snapshot"))
    }

    async fn remove_snapshot(&self, job: &Job) {
        self.remove_best_effort(job, &job.snapshot_key()).await;
    }

    async fn remove_best_effort(&self, job: &Job, key: &str) {
        if let Err(err) = self.artifact_store.remove(key).await {
            tracing::warn!(job_id = %job.job_id, key, ?err, "failed to remove artifact");
        }
    }

    async fn save(&self, job: &Job) -> Result<(), PipelineError> {
        self.job_store
            .put(job)
            .await
            .map_err(PipelineError::storage("save job"))
    }

    /// Records the failure on a freshly loaded record. Only status, message,
    /// and `updated_at` change. Blobs written before the failure are removed
    /// best-effort.
    async fn mark_error(&self, job_id: &str, message: String) -> anyhow::Result<()> {
        let Some(mut job) = self.job_store.get(job_id).await? else {
            return Ok(());
        };

        if let Err(err) = job.transition(JobStatus::Error) {
            tracing::warn!(job_id, %err, "job left in its current state");
            return Ok(());
        }
        for key in [job.snapshot_key(), job.epub_key(), job.content_key()] {
            self.remove_best_effort(&job, &key).await;
        }
        job.error_message = Some(message);
        self.job_store.put(&job).await?;
        Ok(())
    }
}
