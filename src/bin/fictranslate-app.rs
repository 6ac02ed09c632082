use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use clap::Parser;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use fictranslate::app::artifact_store::{ArtifactStore, EPUB_CONTENT_TYPE, LocalFsArtifactStore};
use fictranslate::app::job_store::{JobStore, LocalFsJobStore};
use fictranslate::app::model::{Job, JobQuery, JobStatus};
use fictranslate::app::queue::InProcessQueue;
use fictranslate::app::runner::JobRunner;
use fictranslate::app::service::{DeleteError, JobService, SubmitError, SubmitRequest};
use fictranslate::config::PipelineConfig;

#[derive(Debug, Parser)]
#[command(author, version, about = "Serve the translation job API")]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Directory holding job records and artifacts.
    #[arg(long, default_value = "workspace-app")]
    data_dir: PathBuf,

    /// Jobs running at the same time.
    #[arg(long, default_value_t = 2)]
    max_concurrency: usize,

    /// Jobs allowed to wait for a free runner before submissions are refused.
    #[arg(long, default_value_t = 16)]
    queue_capacity: usize,
}

#[derive(Clone)]
struct AppState {
    service: Arc<JobService>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
}

fn internal(err: anyhow::Error) -> ApiError {
    tracing::error!(?err, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    fictranslate::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting fictranslate-app");

    let config = PipelineConfig::from_env()?;
    let job_store: Arc<dyn JobStore> = Arc::new(LocalFsJobStore::new(&args.data_dir));
    let artifact_store: Arc<dyn ArtifactStore> =
        Arc::new(LocalFsArtifactStore::new(&args.data_dir));
    let runner = Arc::new(JobRunner::from_config(
        Arc::clone(&job_store),
        Arc::clone(&artifact_store),
        &config,
    )?);
    let queue = InProcessQueue::new(args.max_concurrency, args.queue_capacity);
    tracing::info!(
        max_concurrency = queue.max_concurrency(),
        capacity = queue.capacity(),
        batch_size = config.batch_size,
        "job queue ready"
    );

    let state = AppState {
        service: Arc::new(JobService::new(job_store, artifact_store, runner, queue)),
    };

    let app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/jobs", get(list_jobs).post(submit_jobs))
        .route("/api/jobs/:job_id", get(get_job).delete(delete_job))
        .route("/api/jobs/:job_id/book.epub", get(download_epub))
        .route("/api/jobs/:job_id/content", get(get_content))
        .route("/api/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn submit_jobs(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.submit(request).await {
        Ok(outcomes) => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "results": outcomes })),
        )),
        Err(err @ (SubmitError::NoUrls | SubmitError::InvalidUrls(_))) => {
            Err(api_error(StatusCode::BAD_REQUEST, err))
        }
        Err(err @ SubmitError::QueueFull) => {
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, err))
        }
        Err(SubmitError::Store(err)) => Err(internal(err)),
    }
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = state.service.list(&query).await.map_err(internal)?;
    Ok(Json(serde_json::to_value(page).map_err(|err| internal(err.into()))?))
}

async fn load_job(state: &AppState, job_id: &str) -> Result<Job, ApiError> {
    if uuid::Uuid::parse_str(job_id.trim()).is_err() {
        return Err(api_error(StatusCode::BAD_REQUEST, "invalid job id"));
    }
    state
        .service
        .get(job_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "job not found"))
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(load_job(&state, &job_id).await?))
}

async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    load_job(&state, &job_id).await?;
    match state.service.delete(&job_id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(api_error(StatusCode::NOT_FOUND, "job not found")),
        Err(err @ DeleteError::Unfinished(_)) => Err(api_error(StatusCode::CONFLICT, err)),
        Err(DeleteError::Store(err)) => Err(internal(err)),
    }
}

async fn download_epub(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = load_job(&state, &job_id).await?;
    let (JobStatus::Completed, Some(key)) = (job.status, job.epub_path.as_deref()) else {
        return Err(api_error(StatusCode::CONFLICT, "job is not completed"));
    };

    let path = state
        .service
        .artifact_store()
        .local_path(key)
        .map_err(internal)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "epub not found"))?;
    let body = axum::body::Body::from_stream(ReaderStream::new(file));

    let mut resp = Response::new(body);
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(EPUB_CONTENT_TYPE),
    );
    resp.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&job.download_filename()))
            .map_err(|err| internal(err.into()))?,
    );
    Ok(resp)
}

/// ASCII `filename` for old clients plus the UTF-8 name as `filename*`.
fn content_disposition(filename: &str) -> String {
    let fallback = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect::<String>();
    let encoded = filename
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect::<String>();
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

async fn get_content(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = load_job(&state, &job_id).await?;
    let (JobStatus::Completed, Some(key)) = (job.status, job.content_path.as_deref()) else {
        return Err(api_error(StatusCode::CONFLICT, "job is not completed"));
    };
    let bytes = state
        .service
        .artifact_store()
        .get(key)
        .await
        .map_err(internal)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "content not found"))?;

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    owner: Option<String>,
}

async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state
        .service
        .stats(query.owner.as_deref())
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::to_value(stats).map_err(|err| internal(err.into()))?))
}
