use crate::jobs::{claim_next_job, mark_job_done, mark_job_failed};
use crate::ml_client::InferenceLoader;
use crate::stores::{BucketImageStore, PgAnalysisStore, PgRuntimeSettings};
use color_eyre::Result;
use common_creatives::{bucket_dir, get_db_pool, settings};
use ml_analysis::ModelPool;
use pipeline::{PipelineContext, PipelineOptions, RunOutcome, run_with_retry};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

mod jobs;
mod ml_client;
mod stores;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    color_eyre::install()?;

    info!("[Worker ID: {}] Starting.", worker_id());
    let pool = get_db_pool().await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let models = Arc::new(ModelPool::new(Box::new(InferenceLoader::new(
        settings().inference.clone(),
    ))));
    // Warm the engines so the first claimed job does not pay for model
    // startup. Not fatal: the pool retries lazily per stage.
    if let Err(err) = models.preload().await {
        warn!("Model preload failed, will retry on first use: {err}");
    }

    let ctx = PipelineContext {
        store: Arc::new(PgAnalysisStore::new(pool.clone())),
        images: Arc::new(BucketImageStore::new(bucket_dir())),
        runtime_settings: Arc::new(PgRuntimeSettings::new(pool.clone())),
        models,
        options: PipelineOptions::from_settings(settings()),
    };

    worker_loop(&pool, &ctx).await
}

/// The main loop for the worker process, continuously fetching and
/// processing jobs. Each claimed job occupies this worker for the whole run;
/// concurrency comes from running more worker processes.
///
/// # Errors
///
/// * There is a problem communicating with the database when claiming or
///   updating a job. The loop terminates in such a case.
async fn worker_loop(pool: &PgPool, ctx: &PipelineContext) -> Result<()> {
    let worker_id = worker_id();
    let idle_wait = Duration::from_secs(settings().worker.wait_after_empty_queue_s);
    let mut sleeping = false;

    loop {
        if let Some(job) = claim_next_job(pool, &worker_id).await? {
            sleeping = false;
            info!("🐜 Picked up analysis job for creative {}", job.creative_id);

            match run_with_retry(ctx, &job.creative_id).await {
                Ok(RunOutcome::Success) => mark_job_done(pool, job.id).await?,
                Ok(RunOutcome::Aborted) => {
                    // The failure is recorded on the record itself; the job
                    // is spent either way.
                    mark_job_done(pool, job.id).await?;
                }
                Err(err) => mark_job_failed(pool, job.id, &err.to_string()).await?,
            }
        } else {
            if !sleeping {
                sleeping = true;
                info!("💤 No jobs, going to sleep...");
            }
            sleep(idle_wait).await;
        }
    }
}

/// Stable-enough identity for job ownership rows.
fn worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    format!("{host}-{}", std::process::id())
}
