use async_trait::async_trait;
use color_eyre::Result;
use common_creatives::{DetectedObject, InferenceSettings, OcrBlock};
use ml_analysis::{
    ModelLoader, ObjectDetector, OcrEngine, OcrOutput, TopicClassifier, TopicPrediction,
    clean_text, normalize_quad, object_feature_vector,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Client for the inference sidecar that hosts the actual models. The
/// sidecar shares the scratch volume, so requests reference images by path.
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    /// # Errors
    ///
    /// * The HTTP client cannot be built.
    pub fn new(settings: &InferenceSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_s))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Verifies the sidecar is up and has its models loaded.
    ///
    /// # Errors
    ///
    /// * The health endpoint is unreachable or reports failure.
    pub async fn health_check(&self) -> Result<()> {
        self.http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    image_path: &'a str,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
    blocks: Vec<OcrBlockDto>,
}

/// One recognized block; the quadrilateral corners come back in pixel
/// coordinates ordered top-left, top-right, bottom-right, bottom-left.
#[derive(Deserialize)]
struct OcrBlockDto {
    text: String,
    quad: [[f64; 2]; 4],
    confidence: f64,
}

#[async_trait]
impl OcrEngine for InferenceClient {
    async fn extract(
        &self,
        image: &Path,
        image_width: i32,
        image_height: i32,
    ) -> Result<OcrOutput> {
        let image_path = image.to_string_lossy();
        let response: OcrResponse = self
            .http
            .post(format!("{}/ocr", self.base_url))
            .json(&OcrRequest { image_path: image_path.as_ref() })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        #[allow(clippy::cast_sign_loss)]
        let (width, height) = (image_width.max(0) as u32, image_height.max(0) as u32);
        let blocks = response
            .blocks
            .into_iter()
            .map(|block| OcrBlock {
                text: block.text,
                bbox: normalize_quad(block.quad, width, height),
                confidence: block.confidence,
            })
            .collect();
        Ok(OcrOutput { text: response.text, blocks })
    }
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    image_path: &'a str,
    confidence_threshold: f64,
}

#[derive(Deserialize)]
struct DetectResponse {
    objects: Vec<DetectedObject>,
}

#[async_trait]
impl ObjectDetector for InferenceClient {
    async fn detect(
        &self,
        image: &Path,
        confidence_threshold: f64,
    ) -> Result<Vec<DetectedObject>> {
        let image_path = image.to_string_lossy();
        let response: DetectResponse = self
            .http
            .post(format!("{}/detect", self.base_url))
            .json(&DetectRequest {
                image_path: image_path.as_ref(),
                confidence_threshold,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.objects)
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
    object_features: &'a [f64],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    topic: Option<String>,
    confidence: f64,
}

#[async_trait]
impl TopicClassifier for InferenceClient {
    async fn classify(&self, text: &str, objects: &[DetectedObject]) -> Result<TopicPrediction> {
        let cleaned = clean_text(text);
        let features = object_feature_vector(objects);
        let response: ClassifyResponse = self
            .http
            .post(format!("{}/classify", self.base_url))
            .json(&ClassifyRequest { text: &cleaned, object_features: &features })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(TopicPrediction { topic: response.topic, confidence: response.confidence })
    }
}

/// Builds inference clients for the model pool; "loading" here means
/// verifying the sidecar has the model warm.
pub struct InferenceLoader {
    settings: InferenceSettings,
}

impl InferenceLoader {
    #[must_use]
    pub const fn new(settings: InferenceSettings) -> Self {
        Self { settings }
    }

    async fn connect(&self) -> Result<Arc<InferenceClient>> {
        let client = InferenceClient::new(&self.settings)?;
        client.health_check().await?;
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl ModelLoader for InferenceLoader {
    async fn load_ocr(&self) -> Result<Arc<dyn OcrEngine>> {
        Ok(self.connect().await? as Arc<dyn OcrEngine>)
    }

    async fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>> {
        Ok(self.connect().await? as Arc<dyn ObjectDetector>)
    }

    async fn load_classifier(&self) -> Result<Arc<dyn TopicClassifier>> {
        Ok(self.connect().await? as Arc<dyn TopicClassifier>)
    }
}
