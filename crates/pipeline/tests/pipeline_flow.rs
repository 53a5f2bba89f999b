use async_trait::async_trait;
use chrono::Utc;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use common_creatives::{Creative, CreativeAnalysis, DetectedObject, OcrBlock, Stage, StageStatus};
use image::{Rgb, RgbImage};
use ml_analysis::color::ClusterOptions;
use ml_analysis::{
    ModelLoader, ModelPool, ObjectDetector, OcrEngine, OcrOutput, TopicClassifier, TopicPrediction,
};
use pipeline::{
    AnalysisStore, ImageStore, PipelineContext, PipelineOptions, RunOutcome, RuntimeSettings,
    run_pipeline, run_with_retry,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct MemoryStore {
    creatives: Mutex<HashMap<String, Creative>>,
    analyses: Mutex<HashMap<String, CreativeAnalysis>>,
    /// Number of upcoming `save` calls that fail, for retry tests.
    failing_saves: AtomicU32,
}

impl MemoryStore {
    fn with_creative(creative: Creative) -> Self {
        let mut creatives = HashMap::new();
        creatives.insert(creative.creative_id.clone(), creative);
        Self {
            creatives: Mutex::new(creatives),
            analyses: Mutex::new(HashMap::new()),
            failing_saves: AtomicU32::new(0),
        }
    }

    fn analysis(&self, creative_id: &str) -> CreativeAnalysis {
        self.analyses.lock().unwrap()[creative_id].clone()
    }

    fn record_count(&self) -> usize {
        self.analyses.lock().unwrap().len()
    }

    fn creative(&self, creative_id: &str) -> Creative {
        self.creatives.lock().unwrap()[creative_id].clone()
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn get_or_create(&self, creative_id: &str) -> Result<(Creative, CreativeAnalysis)> {
        let creative = self
            .creatives
            .lock()
            .unwrap()
            .get(creative_id)
            .cloned()
            .ok_or_else(|| eyre!("creative {creative_id} not found"))?;
        let analysis = self
            .analyses
            .lock()
            .unwrap()
            .entry(creative_id.to_string())
            .or_insert_with(|| CreativeAnalysis::new(creative_id))
            .clone();
        Ok((creative, analysis))
    }

    async fn save(&self, analysis: &CreativeAnalysis) -> Result<()> {
        if self.failing_saves.load(Ordering::SeqCst) > 0 {
            self.failing_saves.fetch_sub(1, Ordering::SeqCst);
            return Err(eyre!("simulated store outage"));
        }
        self.analyses
            .lock()
            .unwrap()
            .insert(analysis.creative_id.clone(), analysis.clone());
        Ok(())
    }

    async fn update_dimensions(&self, creative_id: &str, width: i32, height: i32) -> Result<()> {
        let mut creatives = self.creatives.lock().unwrap();
        let creative = creatives
            .get_mut(creative_id)
            .ok_or_else(|| eyre!("creative {creative_id} not found"))?;
        creative.image_width = width;
        creative.image_height = height;
        Ok(())
    }
}

/// Serves downloads by copying files out of a bucket directory.
struct DirImageStore {
    bucket: PathBuf,
}

#[async_trait]
impl ImageStore for DirImageStore {
    async fn download(&self, creative: &Creative, dest: &Path) -> Result<()> {
        tokio::fs::copy(self.bucket.join(&creative.file_path), dest).await?;
        Ok(())
    }

    async fn upload(&self, local: &Path, object_key: &str) -> Result<String> {
        tokio::fs::copy(local, self.bucket.join(object_key)).await?;
        Ok(object_key.to_string())
    }
}

struct UnreachableImageStore;

#[async_trait]
impl ImageStore for UnreachableImageStore {
    async fn download(&self, _: &Creative, _: &Path) -> Result<()> {
        Err(eyre!("bucket unreachable"))
    }

    async fn upload(&self, _: &Path, object_key: &str) -> Result<String> {
        Ok(object_key.to_string())
    }
}

struct FixedSettings;

#[async_trait]
impl RuntimeSettings for FixedSettings {
    async fn get_usize(&self, _: &str, default: usize) -> usize {
        default
    }
}

struct FakeOcr;

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn extract(&self, _: &Path, _: i32, _: i32) -> Result<OcrOutput> {
        Ok(OcrOutput {
            text: "big summer sale".to_string(),
            blocks: vec![OcrBlock {
                text: "big summer sale".to_string(),
                bbox: [0.1, 0.1, 0.8, 0.2],
                confidence: 0.93,
            }],
        })
    }
}

struct SlowOcr;

#[async_trait]
impl OcrEngine for SlowOcr {
    async fn extract(&self, _: &Path, _: i32, _: i32) -> Result<OcrOutput> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(OcrOutput::default())
    }
}

struct FakeDetector;

#[async_trait]
impl ObjectDetector for FakeDetector {
    async fn detect(&self, _: &Path, _: f64) -> Result<Vec<DetectedObject>> {
        let object = |label: &str, confidence: f64| DetectedObject {
            label: label.to_string(),
            bbox: [0.1, 0.1, 0.6, 0.6],
            confidence,
        };
        Ok(vec![
            object("cup", 0.55),
            object("handbag", 0.91),
            object("clock", 0.72),
            object("tie", 0.64),
        ])
    }
}

struct FailingDetector;

#[async_trait]
impl ObjectDetector for FailingDetector {
    async fn detect(&self, _: &Path, _: f64) -> Result<Vec<DetectedObject>> {
        Err(eyre!("detector crashed"))
    }
}

struct FakeClassifier {
    topic: Option<&'static str>,
}

#[async_trait]
impl TopicClassifier for FakeClassifier {
    async fn classify(&self, _: &str, _: &[DetectedObject]) -> Result<TopicPrediction> {
        Ok(match self.topic {
            Some(topic) => TopicPrediction { topic: Some(topic.to_string()), confidence: 0.84 },
            None => TopicPrediction::none(),
        })
    }
}

/// Hands out pre-built engines; "loading" is instantaneous.
struct StaticLoader {
    ocr: Arc<dyn OcrEngine>,
    detector: Arc<dyn ObjectDetector>,
    classifier: Arc<dyn TopicClassifier>,
}

#[async_trait]
impl ModelLoader for StaticLoader {
    async fn load_ocr(&self) -> Result<Arc<dyn OcrEngine>> {
        Ok(self.ocr.clone())
    }

    async fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>> {
        Ok(self.detector.clone())
    }

    async fn load_classifier(&self) -> Result<Arc<dyn TopicClassifier>> {
        Ok(self.classifier.clone())
    }
}

struct Harness {
    _dirs: TempDir,
    store: Arc<MemoryStore>,
    ctx: PipelineContext,
}

fn creative(id: &str) -> Creative {
    Creative {
        creative_id: id.to_string(),
        group_id: "g1".to_string(),
        original_filename: "banner.png".to_string(),
        file_path: format!("{id}.png"),
        file_size: 1024,
        file_format: "png".to_string(),
        image_width: 0,
        image_height: 0,
        upload_timestamp: Utc::now(),
    }
}

/// Builds a harness around a seeded creative whose image is a 40x20
/// two-band png in a temp bucket.
fn harness(
    ocr: Arc<dyn OcrEngine>,
    detector: Arc<dyn ObjectDetector>,
    classifier: Arc<dyn TopicClassifier>,
) -> Harness {
    let dirs = TempDir::new().unwrap();
    let bucket = dirs.path().join("bucket");
    std::fs::create_dir_all(&bucket).unwrap();

    let img = RgbImage::from_fn(40, 20, |x, _| {
        if x < 20 { Rgb([220u8, 30, 30]) } else { Rgb([250u8, 250, 250]) }
    });
    img.save(bucket.join("c1.png")).unwrap();
    std::fs::write(bucket.join("corrupt.png"), b"not a png at all").unwrap();

    let store = Arc::new(MemoryStore::with_creative(creative("c1")));
    let ctx = PipelineContext {
        store: store.clone(),
        images: Arc::new(DirImageStore { bucket }),
        runtime_settings: Arc::new(FixedSettings),
        models: Arc::new(ModelPool::new(Box::new(StaticLoader { ocr, detector, classifier }))),
        options: PipelineOptions {
            cluster: ClusterOptions {
                resize: (32, 32),
                n_init: 2,
                max_iter: 30,
                ..ClusterOptions::default()
            },
            scratch_dir: dirs.path().join("scratch"),
            retry_backoff: Duration::from_millis(10),
            ..PipelineOptions::default()
        },
    };
    Harness { _dirs: dirs, store, ctx }
}

fn happy_harness() -> Harness {
    harness(
        Arc::new(FakeOcr),
        Arc::new(FakeDetector),
        Arc::new(FakeClassifier { topic: Some("bags") }),
    )
}

#[tokio::test]
async fn full_run_succeeds_and_fills_every_stage() -> Result<()> {
    let h = happy_harness();
    let outcome = run_pipeline(&h.ctx, "c1").await?;
    assert_eq!(outcome, RunOutcome::Success);

    let analysis = h.store.analysis("c1");
    assert_eq!(analysis.overall_status, StageStatus::Success);
    for stage in Stage::ALL {
        assert_eq!(analysis.stage_status(stage), StageStatus::Success, "{stage}");
        assert!(analysis.stage_started_at(stage).is_some());
        assert!(analysis.stage_completed_at(stage).is_some());
        assert!(analysis.stage_duration(stage).is_some());
    }

    assert_eq!(analysis.ocr_text.as_deref(), Some("big summer sale"));
    assert_eq!(analysis.ocr_blocks.len(), 1);
    // Four detections in, top three kept, best first.
    let labels: Vec<_> = analysis.detected_objects.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, ["handbag", "clock", "tie"]);
    assert_eq!(analysis.main_topic.as_deref(), Some("bags"));
    assert_eq!(analysis.topic_confidence, Some(0.84));
    assert!(!analysis.dominant_colors.is_empty());
    assert!(!analysis.palette_colors.is_empty());
    assert!(analysis.total_duration.is_some());
    assert!(analysis.analysis_timestamp.is_some());

    // Scratch file is gone after the run.
    assert!(!h.ctx.options.scratch_dir.join("c1.png").exists());
    Ok(())
}

#[tokio::test]
async fn detection_failure_is_isolated_from_other_stages() -> Result<()> {
    let h = harness(
        Arc::new(FakeOcr),
        Arc::new(FailingDetector),
        Arc::new(FakeClassifier { topic: Some("cups") }),
    );
    let outcome = run_pipeline(&h.ctx, "c1").await?;
    assert_eq!(outcome, RunOutcome::Success);

    let analysis = h.store.analysis("c1");
    assert_eq!(analysis.detection_status, StageStatus::Error);
    assert_eq!(analysis.ocr_status, StageStatus::Success);
    assert_eq!(analysis.classification_status, StageStatus::Success);
    assert_eq!(analysis.color_status, StageStatus::Success);
    // Stage failures do not block overall success.
    assert_eq!(analysis.overall_status, StageStatus::Success);
    assert!(analysis.detected_objects.is_empty());
    let message = analysis.error_message.unwrap();
    assert!(message.starts_with("detection:"), "{message}");
    Ok(())
}

#[tokio::test]
async fn missing_topic_is_a_soft_stage_error() -> Result<()> {
    let h = harness(
        Arc::new(FakeOcr),
        Arc::new(FakeDetector),
        Arc::new(FakeClassifier { topic: None }),
    );
    let outcome = run_pipeline(&h.ctx, "c1").await?;
    assert_eq!(outcome, RunOutcome::Success);

    let analysis = h.store.analysis("c1");
    assert_eq!(analysis.classification_status, StageStatus::Error);
    assert!(analysis.main_topic.is_none());
    assert_eq!(analysis.color_status, StageStatus::Success);
    assert_eq!(analysis.overall_status, StageStatus::Success);
    Ok(())
}

#[tokio::test]
async fn download_failure_aborts_before_any_stage() -> Result<()> {
    let mut h = happy_harness();
    h.ctx.images = Arc::new(UnreachableImageStore);

    let outcome = run_pipeline(&h.ctx, "c1").await?;
    assert_eq!(outcome, RunOutcome::Aborted);

    let analysis = h.store.analysis("c1");
    assert_eq!(analysis.overall_status, StageStatus::Error);
    for stage in Stage::ALL {
        assert_eq!(analysis.stage_status(stage), StageStatus::Pending);
    }
    assert!(analysis.error_message.unwrap().contains("download"));
    Ok(())
}

#[tokio::test]
async fn corrupt_image_aborts_and_cleans_scratch() -> Result<()> {
    let h = happy_harness();
    {
        let mut creatives = h.store.creatives.lock().unwrap();
        creatives.get_mut("c1").unwrap().file_path = "corrupt.png".to_string();
    }

    let outcome = run_pipeline(&h.ctx, "c1").await?;
    assert_eq!(outcome, RunOutcome::Aborted);

    let analysis = h.store.analysis("c1");
    assert_eq!(analysis.overall_status, StageStatus::Error);
    assert!(analysis.error_message.unwrap().contains("unreadable image"));
    assert_eq!(analysis.ocr_status, StageStatus::Pending);
    assert!(!h.ctx.options.scratch_dir.join("c1.png").exists());
    Ok(())
}

#[tokio::test]
async fn rerun_overwrites_the_same_record() -> Result<()> {
    let h = happy_harness();
    run_pipeline(&h.ctx, "c1").await?;
    let first = h.store.analysis("c1");

    run_pipeline(&h.ctx, "c1").await?;
    let second = h.store.analysis("c1");

    assert_eq!(h.store.record_count(), 1);
    assert_eq!(second.overall_status, StageStatus::Success);
    assert!(second.ocr_started_at.unwrap() > first.ocr_started_at.unwrap());
    Ok(())
}

#[tokio::test]
async fn dimensions_are_corrected_from_the_decoded_image() -> Result<()> {
    let h = happy_harness();
    run_pipeline(&h.ctx, "c1").await?;

    let creative = h.store.creative("c1");
    assert_eq!((creative.image_width, creative.image_height), (40, 20));
    Ok(())
}

#[tokio::test]
async fn transient_store_outage_is_retried() -> Result<()> {
    let h = happy_harness();
    h.store.failing_saves.store(1, Ordering::SeqCst);

    let outcome = run_with_retry(&h.ctx, "c1").await?;
    assert_eq!(outcome, RunOutcome::Success);
    assert_eq!(h.store.analysis("c1").overall_status, StageStatus::Success);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_record_a_terminal_error() {
    let h = happy_harness();
    // One failing save per attempt, so every attempt dies early and the
    // terminal failure write still goes through.
    h.store.failing_saves.store(3, Ordering::SeqCst);

    let result = run_with_retry(&h.ctx, "c1").await;
    assert!(result.is_err());

    let analysis = h.store.analysis("c1");
    assert_eq!(analysis.overall_status, StageStatus::Error);
    assert!(analysis.error_message.unwrap().contains("store outage"));
}

#[tokio::test]
async fn stuck_attempt_trips_the_processing_timeout() {
    let mut h = harness(
        Arc::new(SlowOcr),
        Arc::new(FakeDetector),
        Arc::new(FakeClassifier { topic: Some("bags") }),
    );
    h.ctx.options.max_attempts = 2;
    h.ctx.options.processing_timeout = Duration::from_millis(50);

    let result = run_with_retry(&h.ctx, "c1").await;
    assert!(result.is_err());

    let analysis = h.store.analysis("c1");
    assert_eq!(analysis.overall_status, StageStatus::Error);
    assert!(analysis.error_message.unwrap().contains("timed out"));
}
