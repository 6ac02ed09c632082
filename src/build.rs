use std::sync::Arc;

use anyhow::Context as _;

use crate::app::artifact_store::{ArtifactStore, LocalFsArtifactStore};
use crate::app::job_store::{JobStore, LocalFsJobStore};
use crate::app::model::{DEFAULT_OWNER, Job, JobStatus};
use crate::app::runner::JobRunner;
use crate::cli::{BuildArgs, InspectArgs, WorkIdArgs};
use crate::config::PipelineConfig;
use crate::scrape::WorkScraper;
use crate::source::parse_work_url;

pub fn work_id(args: WorkIdArgs) -> anyhow::Result<()> {
    let work_id = parse_work_url(&args.url)?;
    println!("{work_id}");
    Ok(())
}

pub async fn inspect(args: InspectArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let work_id = parse_work_url(&args.url)?;
    let scraper = WorkScraper::new(config.source_base_url).context("build scraper")?;
    let work = scraper.fetch_work(&work_id).await?;

    let summary = serde_json::json!({
        "work_id": work.work_id,
        "url": work.url,
        "title": work.title,
        "author": work.author,
        "language": work.language,
        "blocks": work.blocks.len(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("serialize summary")?
    );
    Ok(())
}

/// Runs one job in the foreground and copies the EPUB to `--out`.
pub async fn run(args: BuildArgs) -> anyhow::Result<()> {
    if args.out.exists() && !args.force {
        anyhow::bail!(
            "output already exists: {} (use --force to overwrite)",
            args.out.display()
        );
    }
    let work_id = parse_work_url(&args.url)?;

    let mut config = PipelineConfig::from_env()?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size.max(1);
    }

    let job_store: Arc<dyn JobStore> = Arc::new(LocalFsJobStore::new(&args.data_dir));
    let artifact_store: Arc<dyn ArtifactStore> =
        Arc::new(LocalFsArtifactStore::new(&args.data_dir));
    let runner = JobRunner::from_config(
        Arc::clone(&job_store),
        Arc::clone(&artifact_store),
        &config,
    )?;

    let job = Job::new_pending(DEFAULT_OWNER, work_id.as_str(), args.url.clone(), &args.to);
    job_store.create(&job).await.context("create job")?;
    tracing::info!(job_id = %job.job_id, %work_id, to = %args.to, "build: start");

    runner.run_job(&job.job_id).await;

    let job = job_store
        .get(&job.job_id)
        .await
        .context("load job")?
        .ok_or_else(|| anyhow::anyhow!("job disappeared: {}", job.job_id))?;
    if job.status != JobStatus::Completed {
        anyhow::bail!(
            "job {} ended as {}: {}",
            job.job_id,
            job.status,
            job.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    let key = job
        .epub_path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("completed job has no epub: {}", job.job_id))?;
    let epub = artifact_store
        .get(key)
        .await?
        .ok_or_else(|| anyhow::anyhow!("epub missing from store: {key}"))?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    std::fs::write(&args.out, &epub)
        .with_context(|| format!("write epub: {}", args.out.display()))?;

    tracing::info!(
        job_id = %job.job_id,
        out = %args.out.display(),
        paragraphs = job.total_paragraphs,
        words = job.word_count,
        "build: done"
    );
    Ok(())
}
