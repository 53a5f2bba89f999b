use crate::stages::{
    run_classification_stage, run_color_stage, run_detection_stage, run_ocr_stage,
};
use crate::store::{AnalysisStore, ImageStore, RuntimeSettings};
use chrono::Utc;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use common_creatives::{AppSettings, Creative, CreativeAnalysis, StageStatus};
use ml_analysis::ModelPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// Everything one worker needs to run pipelines: collaborator
/// implementations, the per-process model cache and static tuning.
pub struct PipelineContext {
    pub store: Arc<dyn AnalysisStore>,
    pub images: Arc<dyn ImageStore>,
    pub runtime_settings: Arc<dyn RuntimeSettings>,
    pub models: Arc<ModelPool>,
    pub options: PipelineOptions,
}

/// Static pipeline tuning; the hot-reloadable color counts live behind
/// [`RuntimeSettings`] instead.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub detection_confidence_threshold: f64,
    pub max_detections: usize,
    pub cluster: ml_analysis::color::ClusterOptions,
    /// Where images live for the duration of one run.
    pub scratch_dir: PathBuf,
    /// Attempts for one unit of work before giving up.
    pub max_attempts: u32,
    /// Fixed sleep between attempts.
    pub retry_backoff: Duration,
    /// Safety net around a single attempt; a stuck stage trips it and the
    /// attempt counts as failed.
    pub processing_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            detection_confidence_threshold: 0.35,
            max_detections: 3,
            cluster: ml_analysis::color::ClusterOptions::default(),
            scratch_dir: std::env::temp_dir().join("creative-analysis"),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(5),
            processing_timeout: Duration::from_secs(300),
        }
    }
}

impl PipelineOptions {
    #[must_use]
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            detection_confidence_threshold: settings.pipeline.detection_confidence_threshold,
            max_detections: settings.pipeline.max_detections,
            cluster: ml_analysis::color::ClusterOptions {
                resize: (
                    settings.color_analysis.resize_width,
                    settings.color_analysis.resize_height,
                ),
                coeff: settings.color_analysis.cluster_coeff,
                ..ml_analysis::color::ClusterOptions::default()
            },
            scratch_dir: PathBuf::from(&settings.directories.scratch_folder),
            max_attempts: settings.worker.max_attempts,
            retry_backoff: Duration::from_secs(settings.worker.retry_backoff_s),
            processing_timeout: Duration::from_secs(settings.worker.processing_timeout_s),
        }
    }
}

/// How one attempt ended. Both variants are terminal for the record;
/// `Aborted` means a fatal-to-run condition (download or decode failure) was
/// recorded as overall ERROR before any stage ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Aborted,
}

/// Runs the four analysis stages for one creative, exactly once.
///
/// Overall status reaches SUCCESS whenever stage sequencing completes,
/// independent of individual stage outcomes; stage failures are isolated
/// inside the stage runners. The scratch image is removed on every exit
/// path.
///
/// # Errors
///
/// * The creative or its record cannot be loaded or persisted. Such errors
///   are transient from the pipeline's point of view and trigger the retry
///   policy in [`run_with_retry`].
pub async fn run_pipeline(ctx: &PipelineContext, creative_id: &str) -> Result<RunOutcome> {
    info!("[{creative_id}] Starting analysis run");
    let (mut creative, mut analysis) = ctx.store.get_or_create(creative_id).await?;

    analysis.overall_status = StageStatus::Processing;
    analysis.error_message = None;
    ctx.store.save(&analysis).await?;

    // Stage the image locally for the duration of the run.
    let local_image = scratch_path(&ctx.options, &creative);
    tokio::fs::create_dir_all(&ctx.options.scratch_dir).await?;
    if let Err(err) = ctx.images.download(&creative, &local_image).await {
        error!("[{creative_id}] Image download failed: {err}");
        analysis.overall_status = StageStatus::Error;
        analysis.error_message = Some(format!("image download failed: {err}"));
        ctx.store.save(&analysis).await?;
        return Ok(RunOutcome::Aborted);
    }

    let dimensions = image::image_dimensions(&local_image);
    let (width, height) = match dimensions {
        Ok(dims) => dims,
        Err(err) => {
            error!("[{creative_id}] Unreadable image: {err}");
            analysis.overall_status = StageStatus::Error;
            analysis.error_message = Some(format!("unreadable image: {err}"));
            ctx.store.save(&analysis).await?;
            remove_scratch(&local_image).await;
            return Ok(RunOutcome::Aborted);
        }
    };

    // Correct dimensions recorded at upload time if they turn out wrong.
    #[allow(clippy::cast_possible_wrap)]
    let (width, height) = (width as i32, height as i32);
    if creative.image_width != width || creative.image_height != height {
        ctx.store.update_dimensions(creative_id, width, height).await?;
        creative.image_width = width;
        creative.image_height = height;
    }

    let sequenced = run_stages(ctx, &creative, &mut analysis, &local_image).await;
    remove_scratch(&local_image).await;
    sequenced?;

    let completed = Utc::now();
    analysis.overall_status = StageStatus::Success;
    analysis.analysis_timestamp = Some(completed);
    // OCR runs first, so its start timestamp marks the start of the run.
    let run_start = analysis.ocr_started_at.unwrap_or(completed);
    analysis.total_duration = Some((completed - run_start).as_seconds_f64());
    ctx.store.save(&analysis).await?;

    info!("[{creative_id}] Analysis run finished");
    Ok(RunOutcome::Success)
}

async fn run_stages(
    ctx: &PipelineContext,
    creative: &Creative,
    analysis: &mut CreativeAnalysis,
    local_image: &std::path::Path,
) -> Result<()> {
    // Fixed order: classification consumes OCR text and detections, so both
    // precede it; color is independent and runs last.
    run_ocr_stage(ctx, creative, analysis, local_image).await?;
    run_detection_stage(ctx, creative, analysis, local_image).await?;
    run_classification_stage(ctx, creative, analysis).await?;
    run_color_stage(ctx, creative, analysis, local_image).await?;
    Ok(())
}

/// Runs [`run_pipeline`] with the bounded retry policy: up to
/// `max_attempts` attempts with a fixed backoff, each attempt capped by the
/// processing timeout. Exhausting the attempts records overall ERROR with
/// the final error message and propagates the error to the caller.
///
/// # Errors
///
/// * The final attempt failed (after the failure was recorded).
pub async fn run_with_retry(ctx: &PipelineContext, creative_id: &str) -> Result<RunOutcome> {
    let max_attempts = ctx.options.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let attempted = timeout(ctx.options.processing_timeout, run_pipeline(ctx, creative_id))
            .await
            .unwrap_or_else(|_| {
                Err(eyre!(
                    "processing timed out after {}s",
                    ctx.options.processing_timeout.as_secs()
                ))
            });

        let err = match attempted {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };

        // A timed-out or crashed attempt may leave its scratch file behind;
        // clean it up so sustained retries cannot exhaust the disk.
        if let Ok((creative, _)) = ctx.store.get_or_create(creative_id).await {
            remove_scratch(&scratch_path(&ctx.options, &creative)).await;
        }

        if attempt == max_attempts {
            error!("[{creative_id}] Attempt {attempt}/{max_attempts} failed, giving up: {err}");
            record_terminal_failure(ctx, creative_id, &err).await;
            return Err(err);
        }
        warn!("[{creative_id}] Attempt {attempt}/{max_attempts} failed, retrying: {err}");
        sleep(ctx.options.retry_backoff).await;
    }
    unreachable!("loop returns on success or final attempt")
}

async fn record_terminal_failure(ctx: &PipelineContext, creative_id: &str, err: &color_eyre::Report) {
    match ctx.store.get_or_create(creative_id).await {
        Ok((_, mut analysis)) => {
            analysis.overall_status = StageStatus::Error;
            analysis.error_message = Some(err.to_string());
            if let Err(save_err) = ctx.store.save(&analysis).await {
                error!("[{creative_id}] Could not record terminal failure: {save_err}");
            }
        }
        Err(load_err) => {
            error!("[{creative_id}] Could not load record for terminal failure: {load_err}");
        }
    }
}

fn scratch_path(options: &PipelineOptions, creative: &Creative) -> PathBuf {
    options
        .scratch_dir
        .join(format!("{}.{}", creative.creative_id, creative.file_format))
}

async fn remove_scratch(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Could not remove scratch file {}: {err}", path.display()),
    }
}
