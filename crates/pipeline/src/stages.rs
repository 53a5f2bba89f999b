use crate::orchestrator::PipelineContext;
use crate::store::{DOMINANT_COLORS_COUNT, SECONDARY_COLORS_COUNT};
use chrono::Utc;
use color_eyre::Result;
use common_creatives::{Creative, CreativeAnalysis, DetectedObject, Stage, StageStatus};
use ml_analysis::color::{classify_by_palette, extract_top_colors};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{info, warn};

/// Marks the stage PROCESSING with its start timestamp and persists, so a
/// status query mid-flight can compute elapsed time.
async fn begin_stage(
    ctx: &PipelineContext,
    analysis: &mut CreativeAnalysis,
    stage: Stage,
) -> Result<()> {
    analysis.set_stage_status(stage, StageStatus::Processing);
    analysis.set_stage_started_at(stage, Some(Utc::now()));
    ctx.store.save(analysis).await
}

/// Closes the stage with `status`, stamping completion and duration.
async fn finish_stage(
    ctx: &PipelineContext,
    analysis: &mut CreativeAnalysis,
    stage: Stage,
    status: StageStatus,
) -> Result<()> {
    let completed = Utc::now();
    analysis.set_stage_status(stage, status);
    analysis.set_stage_completed_at(stage, Some(completed));
    if let Some(started) = analysis.stage_started_at(stage) {
        analysis.set_stage_duration(stage, Some((completed - started).as_seconds_f64()));
    }
    ctx.store.save(analysis).await
}

/// Records an isolated stage failure. The error is captured on the record
/// and the run proceeds; stages are independent signals and losing one must
/// not invalidate the others.
async fn fail_stage(
    ctx: &PipelineContext,
    analysis: &mut CreativeAnalysis,
    stage: Stage,
    message: &str,
) -> Result<()> {
    warn!("[{}] {stage} stage failed: {message}", analysis.creative_id);
    analysis.error_message = Some(format!("{stage}: {message}"));
    finish_stage(ctx, analysis, stage, StageStatus::Error).await
}

pub(crate) async fn run_ocr_stage(
    ctx: &PipelineContext,
    creative: &Creative,
    analysis: &mut CreativeAnalysis,
    image: &Path,
) -> Result<()> {
    info!("[{}] Starting OCR", creative.creative_id);
    begin_stage(ctx, analysis, Stage::Ocr).await?;

    let extracted = match ctx.models.ocr().await {
        Ok(engine) => {
            engine
                .extract(image, creative.image_width, creative.image_height)
                .await
        }
        Err(err) => Err(err),
    };

    match extracted {
        Ok(output) => {
            analysis.ocr_text = Some(output.text);
            analysis.ocr_blocks = output.blocks;
            finish_stage(ctx, analysis, Stage::Ocr, StageStatus::Success).await
        }
        Err(err) => fail_stage(ctx, analysis, Stage::Ocr, &err.to_string()).await,
    }
}

pub(crate) async fn run_detection_stage(
    ctx: &PipelineContext,
    creative: &Creative,
    analysis: &mut CreativeAnalysis,
    image: &Path,
) -> Result<()> {
    info!("[{}] Starting object detection", creative.creative_id);
    begin_stage(ctx, analysis, Stage::Detection).await?;

    let detected = match ctx.models.detector().await {
        Ok(detector) => {
            detector
                .detect(image, ctx.options.detection_confidence_threshold)
                .await
        }
        Err(err) => Err(err),
    };

    match detected {
        Ok(objects) => {
            analysis.detected_objects = top_detections(objects, ctx.options.max_detections);
            finish_stage(ctx, analysis, Stage::Detection, StageStatus::Success).await
        }
        Err(err) => fail_stage(ctx, analysis, Stage::Detection, &err.to_string()).await,
    }
}

pub(crate) async fn run_classification_stage(
    ctx: &PipelineContext,
    creative: &Creative,
    analysis: &mut CreativeAnalysis,
) -> Result<()> {
    info!("[{}] Starting topic classification", creative.creative_id);
    begin_stage(ctx, analysis, Stage::Classification).await?;

    let text = analysis.ocr_text.clone().unwrap_or_default();
    let predicted = match ctx.models.classifier().await {
        Ok(classifier) => classifier.classify(&text, &analysis.detected_objects).await,
        Err(err) => Err(err),
    };

    match predicted {
        Ok(prediction) => match prediction.topic {
            Some(topic) => {
                analysis.main_topic = Some(topic);
                analysis.topic_confidence = Some(prediction.confidence);
                finish_stage(ctx, analysis, Stage::Classification, StageStatus::Success).await
            }
            // The designed soft-failure value: no topic found. Marked as a
            // stage error, but the run continues like any isolated failure.
            None => fail_stage(ctx, analysis, Stage::Classification, "no topic predicted").await,
        },
        Err(err) => fail_stage(ctx, analysis, Stage::Classification, &err.to_string()).await,
    }
}

pub(crate) async fn run_color_stage(
    ctx: &PipelineContext,
    creative: &Creative,
    analysis: &mut CreativeAnalysis,
    image: &Path,
) -> Result<()> {
    info!("[{}] Starting color analysis", creative.creative_id);
    begin_stage(ctx, analysis, Stage::Color).await?;

    // Counts are re-read every run so the setting is hot-reloadable.
    let n_dominant = ctx.runtime_settings.get_usize(DOMINANT_COLORS_COUNT, 3).await;
    let n_secondary = ctx.runtime_settings.get_usize(SECONDARY_COLORS_COUNT, 3).await;

    let extraction = extract_top_colors(image, n_dominant, n_secondary, &ctx.options.cluster);
    let palette = classify_by_palette(&extraction);

    analysis.dominant_colors = extraction.dominant_colors;
    analysis.secondary_colors = extraction.secondary_colors;
    analysis.palette_colors = palette;
    finish_stage(ctx, analysis, Stage::Color, StageStatus::Success).await
}

/// Keeps the `max` highest-confidence detections, best first.
fn top_detections(mut objects: Vec<DetectedObject>, max: usize) -> Vec<DetectedObject> {
    objects.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    objects.truncate(max);
    objects
}
