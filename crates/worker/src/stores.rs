use async_trait::async_trait;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use common_creatives::{Creative, CreativeAnalysis, StageStatus};
use pipeline::{AnalysisStore, ImageStore, RuntimeSettings};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Analysis persistence on Postgres.
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn creative_from_row(row: &PgRow) -> Result<Creative> {
    Ok(Creative {
        creative_id: row.try_get("creative_id")?,
        group_id: row.try_get("group_id")?,
        original_filename: row.try_get("original_filename")?,
        file_path: row.try_get("file_path")?,
        file_size: row.try_get("file_size")?,
        file_format: row.try_get("file_format")?,
        image_width: row.try_get("image_width")?,
        image_height: row.try_get("image_height")?,
        upload_timestamp: row.try_get("upload_timestamp")?,
    })
}

fn analysis_from_row(row: &PgRow) -> Result<CreativeAnalysis> {
    let status = |column: &str| -> Result<StageStatus> {
        let value: String = row.try_get(column)?;
        Ok(StageStatus::from_db(&value))
    };
    Ok(CreativeAnalysis {
        creative_id: row.try_get("creative_id")?,
        ocr_status: status("ocr_status")?,
        ocr_started_at: row.try_get("ocr_started_at")?,
        ocr_completed_at: row.try_get("ocr_completed_at")?,
        ocr_duration: row.try_get("ocr_duration")?,
        detection_status: status("detection_status")?,
        detection_started_at: row.try_get("detection_started_at")?,
        detection_completed_at: row.try_get("detection_completed_at")?,
        detection_duration: row.try_get("detection_duration")?,
        classification_status: status("classification_status")?,
        classification_started_at: row.try_get("classification_started_at")?,
        classification_completed_at: row.try_get("classification_completed_at")?,
        classification_duration: row.try_get("classification_duration")?,
        color_status: status("color_status")?,
        color_started_at: row.try_get("color_started_at")?,
        color_completed_at: row.try_get("color_completed_at")?,
        color_duration: row.try_get("color_duration")?,
        overall_status: status("overall_status")?,
        analysis_timestamp: row.try_get("analysis_timestamp")?,
        total_duration: row.try_get("total_duration")?,
        error_message: row.try_get("error_message")?,
        ocr_text: row.try_get("ocr_text")?,
        ocr_blocks: serde_json::from_value(row.try_get("ocr_blocks")?)?,
        detected_objects: serde_json::from_value(row.try_get("detected_objects")?)?,
        main_topic: row.try_get("main_topic")?,
        topic_confidence: row.try_get("topic_confidence")?,
        dominant_colors: serde_json::from_value(row.try_get("dominant_colors")?)?,
        secondary_colors: serde_json::from_value(row.try_get("secondary_colors")?)?,
        palette_colors: serde_json::from_value(row.try_get("palette_colors")?)?,
    })
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn get_or_create(&self, creative_id: &str) -> Result<(Creative, CreativeAnalysis)> {
        let creative_row = sqlx::query("SELECT * FROM creatives WHERE creative_id = $1")
            .bind(creative_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| eyre!("creative {creative_id} not found"))?;
        let creative = creative_from_row(&creative_row)?;

        sqlx::query(
            "INSERT INTO creative_analysis (creative_id) VALUES ($1) ON CONFLICT (creative_id) DO NOTHING",
        )
        .bind(creative_id)
        .execute(&self.pool)
        .await?;

        let analysis_row = sqlx::query("SELECT * FROM creative_analysis WHERE creative_id = $1")
            .bind(creative_id)
            .fetch_one(&self.pool)
            .await?;
        let analysis = analysis_from_row(&analysis_row)?;

        Ok((creative, analysis))
    }

    async fn save(&self, analysis: &CreativeAnalysis) -> Result<()> {
        sqlx::query(
            r"
            UPDATE creative_analysis
            SET ocr_status                  = $2,
                ocr_started_at              = $3,
                ocr_completed_at            = $4,
                ocr_duration                = $5,
                detection_status            = $6,
                detection_started_at        = $7,
                detection_completed_at      = $8,
                detection_duration          = $9,
                classification_status       = $10,
                classification_started_at   = $11,
                classification_completed_at = $12,
                classification_duration     = $13,
                color_status                = $14,
                color_started_at            = $15,
                color_completed_at          = $16,
                color_duration              = $17,
                overall_status              = $18,
                analysis_timestamp          = $19,
                total_duration              = $20,
                error_message               = $21,
                ocr_text                    = $22,
                ocr_blocks                  = $23,
                detected_objects            = $24,
                main_topic                  = $25,
                topic_confidence            = $26,
                dominant_colors             = $27,
                secondary_colors            = $28,
                palette_colors              = $29
            WHERE creative_id = $1
            ",
        )
        .bind(&analysis.creative_id)
        .bind(analysis.ocr_status.as_str())
        .bind(analysis.ocr_started_at)
        .bind(analysis.ocr_completed_at)
        .bind(analysis.ocr_duration)
        .bind(analysis.detection_status.as_str())
        .bind(analysis.detection_started_at)
        .bind(analysis.detection_completed_at)
        .bind(analysis.detection_duration)
        .bind(analysis.classification_status.as_str())
        .bind(analysis.classification_started_at)
        .bind(analysis.classification_completed_at)
        .bind(analysis.classification_duration)
        .bind(analysis.color_status.as_str())
        .bind(analysis.color_started_at)
        .bind(analysis.color_completed_at)
        .bind(analysis.color_duration)
        .bind(analysis.overall_status.as_str())
        .bind(analysis.analysis_timestamp)
        .bind(analysis.total_duration)
        .bind(&analysis.error_message)
        .bind(&analysis.ocr_text)
        .bind(serde_json::to_value(&analysis.ocr_blocks)?)
        .bind(serde_json::to_value(&analysis.detected_objects)?)
        .bind(&analysis.main_topic)
        .bind(analysis.topic_confidence)
        .bind(serde_json::to_value(&analysis.dominant_colors)?)
        .bind(serde_json::to_value(&analysis.secondary_colors)?)
        .bind(serde_json::to_value(&analysis.palette_colors)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_dimensions(&self, creative_id: &str, width: i32, height: i32) -> Result<()> {
        sqlx::query(
            "UPDATE creatives SET image_width = $2, image_height = $3 WHERE creative_id = $1",
        )
        .bind(creative_id)
        .bind(width)
        .bind(height)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Hot-reloadable settings from the `app_settings` table. Reads are best
/// effort: a missing key, unparsable value or database hiccup falls back to
/// the default instead of failing the color stage.
pub struct PgRuntimeSettings {
    pool: PgPool,
}

impl PgRuntimeSettings {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuntimeSettings for PgRuntimeSettings {
    async fn get_usize(&self, key: &str, default: usize) -> usize {
        let value: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT value FROM app_settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await;
        match value {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Setting {key} has non-numeric value {raw:?}, using {default}");
                default
            }),
            Ok(None) => default,
            Err(err) => {
                warn!("Could not read setting {key}: {err}, using {default}");
                default
            }
        }
    }
}

/// Object store backed by a bucket directory on shared storage.
pub struct BucketImageStore {
    bucket: PathBuf,
}

impl BucketImageStore {
    #[must_use]
    pub fn new(bucket: impl Into<PathBuf>) -> Self {
        Self { bucket: bucket.into() }
    }
}

#[async_trait]
impl ImageStore for BucketImageStore {
    async fn download(&self, creative: &Creative, dest: &Path) -> Result<()> {
        tokio::fs::copy(self.bucket.join(&creative.file_path), dest).await?;
        Ok(())
    }

    async fn upload(&self, local: &Path, object_key: &str) -> Result<String> {
        let target = self.bucket.join(object_key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, target).await?;
        Ok(object_key.to_string())
    }
}
