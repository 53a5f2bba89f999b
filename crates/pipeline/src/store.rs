use async_trait::async_trait;
use color_eyre::Result;
use common_creatives::{Creative, CreativeAnalysis};
use std::path::Path;

/// Runtime setting key for the dominant color count.
pub const DOMINANT_COLORS_COUNT: &str = "DOMINANT_COLORS_COUNT";
/// Runtime setting key for the secondary color count.
pub const SECONDARY_COLORS_COUNT: &str = "SECONDARY_COLORS_COUNT";

/// Persistence seam for creatives and their analysis records.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Fetches a creative and its analysis record, creating the record with
    /// every stage PENDING the first time the creative is processed. Re-runs
    /// find the existing record, so no duplicate can appear.
    ///
    /// # Errors
    ///
    /// * The creative does not exist.
    /// * The backing store fails.
    async fn get_or_create(&self, creative_id: &str) -> Result<(Creative, CreativeAnalysis)>;

    /// Persists the record. Called after every status transition so a
    /// concurrent status query observes intermediate PROCESSING states.
    ///
    /// # Errors
    ///
    /// * The backing store fails.
    async fn save(&self, analysis: &CreativeAnalysis) -> Result<()>;

    /// Corrects the stored image dimensions when the decoded values differ
    /// from what the upload handler recorded.
    ///
    /// # Errors
    ///
    /// * The backing store fails.
    async fn update_dimensions(&self, creative_id: &str, width: i32, height: i32) -> Result<()>;
}

/// Object-store seam for creative originals.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Downloads the creative's original image to `dest`.
    ///
    /// # Errors
    ///
    /// * The object is missing or the transfer fails.
    async fn download(&self, creative: &Creative, dest: &Path) -> Result<()>;

    /// Stores a local file under `object_key`; returns the stored key.
    /// Used by upload handling, not by the pipeline itself.
    ///
    /// # Errors
    ///
    /// * The transfer fails.
    async fn upload(&self, local: &Path, object_key: &str) -> Result<String>;
}

/// Hot-reloadable settings. The color stage reads its counts through this on
/// every invocation instead of caching them, so operators can retune a
/// running system.
#[async_trait]
pub trait RuntimeSettings: Send + Sync {
    /// Reads a numeric setting, falling back to `default` when the key is
    /// absent or not parsable.
    async fn get_usize(&self, key: &str, default: usize) -> usize;
}
