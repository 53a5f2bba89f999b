use async_trait::async_trait;
use color_eyre::Result;
use common_creatives::{DetectedObject, OcrBlock};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Text recognition output: the concatenated text plus per-block detail.
#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub text: String,
    pub blocks: Vec<OcrBlock>,
}

/// Topic prediction; `topic: None` with zero confidence is the designed
/// "no topic found" value, not an error.
#[derive(Debug, Clone)]
pub struct TopicPrediction {
    pub topic: Option<String>,
    pub confidence: f64,
}

impl TopicPrediction {
    #[must_use]
    pub const fn none() -> Self {
        Self { topic: None, confidence: 0.0 }
    }
}

/// Extracts text from a creative image. Block bounding boxes come back
/// normalized to `[0, 1]` using the supplied image dimensions.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract(
        &self,
        image: &Path,
        image_width: i32,
        image_height: i32,
    ) -> Result<OcrOutput>;
}

/// Detects objects in a creative image. Detections below
/// `confidence_threshold` are excluded by the engine itself.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, image: &Path, confidence_threshold: f64)
    -> Result<Vec<DetectedObject>>;
}

/// Predicts the product topic from OCR text and detections.
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn classify(&self, text: &str, objects: &[DetectedObject]) -> Result<TopicPrediction>;
}

/// Builds the inference engines; called at most once per engine per worker
/// process by [`ModelPool`].
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load_ocr(&self) -> Result<Arc<dyn OcrEngine>>;
    async fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>>;
    async fn load_classifier(&self) -> Result<Arc<dyn TopicClassifier>>;
}

/// Per-worker model cache. Each engine is initialized lazily on first use
/// and then shared read-only across the sequential pipeline runs this worker
/// executes over its lifetime.
pub struct ModelPool {
    loader: Box<dyn ModelLoader>,
    ocr: OnceCell<Arc<dyn OcrEngine>>,
    detector: OnceCell<Arc<dyn ObjectDetector>>,
    classifier: OnceCell<Arc<dyn TopicClassifier>>,
}

impl ModelPool {
    #[must_use]
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            ocr: OnceCell::new(),
            detector: OnceCell::new(),
            classifier: OnceCell::new(),
        }
    }

    /// # Errors
    ///
    /// * The loader fails to build the OCR engine; a later call retries.
    pub async fn ocr(&self) -> Result<&Arc<dyn OcrEngine>> {
        self.ocr
            .get_or_try_init(|| async {
                info!("Initializing OCR engine");
                self.loader.load_ocr().await
            })
            .await
    }

    /// # Errors
    ///
    /// * The loader fails to build the detector; a later call retries.
    pub async fn detector(&self) -> Result<&Arc<dyn ObjectDetector>> {
        self.detector
            .get_or_try_init(|| async {
                info!("Initializing object detector");
                self.loader.load_detector().await
            })
            .await
    }

    /// # Errors
    ///
    /// * The loader fails to build the classifier; a later call retries.
    pub async fn classifier(&self) -> Result<&Arc<dyn TopicClassifier>> {
        self.classifier
            .get_or_try_init(|| async {
                info!("Initializing topic classifier");
                self.loader.load_classifier().await
            })
            .await
    }

    /// Eagerly initializes all engines, so the first claimed job does not
    /// pay the model load cost.
    ///
    /// # Errors
    ///
    /// * Any engine fails to load.
    pub async fn preload(&self) -> Result<()> {
        self.ocr().await?;
        self.detector().await?;
        self.classifier().await?;
        Ok(())
    }
}
