use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An uploaded creative image asset.
///
/// Immutable after upload except `image_width`/`image_height`, which are
/// corrected once at pipeline start when the decoded dimensions disagree
/// with what the upload handler recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creative {
    pub creative_id: String,
    /// Groups creatives uploaded together in one batch.
    pub group_id: String,
    pub original_filename: String,
    /// Object key inside the creatives bucket.
    pub file_path: String,
    pub file_size: i64,
    pub file_format: String,
    pub image_width: i32,
    pub image_height: i32,
    pub upload_timestamp: DateTime<Utc>,
}

/// Lifecycle state shared by the four analysis stages and the overall run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Error,
}

impl StageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }

    /// Parses the database representation, defaulting unknown values to PENDING.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        match value {
            "PROCESSING" => Self::Processing,
            "SUCCESS" => Self::Success,
            "ERROR" => Self::Error,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the four analysis stages, in fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ocr,
    Detection,
    Classification,
    Color,
}

impl Stage {
    /// Execution order: classification consumes OCR and detection output,
    /// color is independent and runs last.
    pub const ALL: [Self; 4] = [Self::Ocr, Self::Detection, Self::Classification, Self::Color];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Detection => "detection",
            Self::Classification => "classification",
            Self::Color => "color",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A recognized text block with its bounding box normalized to `[0, 1]`
/// (`[x1, y1, x2, y2]`, top-left and bottom-right corners).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrBlock {
    pub text: String,
    pub bbox: [f64; 4],
    pub confidence: f64,
}

/// A detected object with its bounding box normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub bbox: [f64; 4],
    pub confidence: f64,
}

/// One representative color extracted by pixel clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSample {
    pub rgb: [u8; 3],
    /// `#`-prefixed lowercase hex of `rgb`.
    pub hex: String,
    /// Share of total pixels, percent, 2 decimals.
    pub percent: f64,
}

/// Accumulated share of one semantic color class after palette classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteShare {
    /// `#`-prefixed hex of the last palette entry resolved for this class.
    pub hex: String,
    pub percent: f64,
}

/// Mutable per-creative processing state, one-to-one with [`Creative`].
///
/// Created with every field at its default the first time a creative is
/// submitted for processing, then mutated stage by stage by the pipeline.
/// The pipeline never deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeAnalysis {
    pub creative_id: String,

    pub ocr_status: StageStatus,
    pub ocr_started_at: Option<DateTime<Utc>>,
    pub ocr_completed_at: Option<DateTime<Utc>>,
    pub ocr_duration: Option<f64>,

    pub detection_status: StageStatus,
    pub detection_started_at: Option<DateTime<Utc>>,
    pub detection_completed_at: Option<DateTime<Utc>>,
    pub detection_duration: Option<f64>,

    pub classification_status: StageStatus,
    pub classification_started_at: Option<DateTime<Utc>>,
    pub classification_completed_at: Option<DateTime<Utc>>,
    pub classification_duration: Option<f64>,

    pub color_status: StageStatus,
    pub color_started_at: Option<DateTime<Utc>>,
    pub color_completed_at: Option<DateTime<Utc>>,
    pub color_duration: Option<f64>,

    pub overall_status: StageStatus,
    /// Completion timestamp of the whole run.
    pub analysis_timestamp: Option<DateTime<Utc>>,
    /// Seconds from the OCR stage start to run completion.
    pub total_duration: Option<f64>,
    pub error_message: Option<String>,

    pub ocr_text: Option<String>,
    pub ocr_blocks: Vec<OcrBlock>,
    pub detected_objects: Vec<DetectedObject>,
    pub main_topic: Option<String>,
    pub topic_confidence: Option<f64>,
    pub dominant_colors: Vec<ColorSample>,
    pub secondary_colors: Vec<ColorSample>,
    pub palette_colors: BTreeMap<String, PaletteShare>,
}

impl CreativeAnalysis {
    /// Fresh record with all stages PENDING and no outputs.
    #[must_use]
    pub fn new(creative_id: impl Into<String>) -> Self {
        Self {
            creative_id: creative_id.into(),
            ocr_status: StageStatus::Pending,
            ocr_started_at: None,
            ocr_completed_at: None,
            ocr_duration: None,
            detection_status: StageStatus::Pending,
            detection_started_at: None,
            detection_completed_at: None,
            detection_duration: None,
            classification_status: StageStatus::Pending,
            classification_started_at: None,
            classification_completed_at: None,
            classification_duration: None,
            color_status: StageStatus::Pending,
            color_started_at: None,
            color_completed_at: None,
            color_duration: None,
            overall_status: StageStatus::Pending,
            analysis_timestamp: None,
            total_duration: None,
            error_message: None,
            ocr_text: None,
            ocr_blocks: Vec::new(),
            detected_objects: Vec::new(),
            main_topic: None,
            topic_confidence: None,
            dominant_colors: Vec::new(),
            secondary_colors: Vec::new(),
            palette_colors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn stage_status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Ocr => self.ocr_status,
            Stage::Detection => self.detection_status,
            Stage::Classification => self.classification_status,
            Stage::Color => self.color_status,
        }
    }

    pub const fn set_stage_status(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Ocr => self.ocr_status = status,
            Stage::Detection => self.detection_status = status,
            Stage::Classification => self.classification_status = status,
            Stage::Color => self.color_status = status,
        }
    }

    #[must_use]
    pub const fn stage_started_at(&self, stage: Stage) -> Option<DateTime<Utc>> {
        match stage {
            Stage::Ocr => self.ocr_started_at,
            Stage::Detection => self.detection_started_at,
            Stage::Classification => self.classification_started_at,
            Stage::Color => self.color_started_at,
        }
    }

    pub const fn set_stage_started_at(&mut self, stage: Stage, at: Option<DateTime<Utc>>) {
        match stage {
            Stage::Ocr => self.ocr_started_at = at,
            Stage::Detection => self.detection_started_at = at,
            Stage::Classification => self.classification_started_at = at,
            Stage::Color => self.color_started_at = at,
        }
    }

    #[must_use]
    pub const fn stage_completed_at(&self, stage: Stage) -> Option<DateTime<Utc>> {
        match stage {
            Stage::Ocr => self.ocr_completed_at,
            Stage::Detection => self.detection_completed_at,
            Stage::Classification => self.classification_completed_at,
            Stage::Color => self.color_completed_at,
        }
    }

    pub const fn set_stage_completed_at(&mut self, stage: Stage, at: Option<DateTime<Utc>>) {
        match stage {
            Stage::Ocr => self.ocr_completed_at = at,
            Stage::Detection => self.detection_completed_at = at,
            Stage::Classification => self.classification_completed_at = at,
            Stage::Color => self.color_completed_at = at,
        }
    }

    #[must_use]
    pub const fn stage_duration(&self, stage: Stage) -> Option<f64> {
        match stage {
            Stage::Ocr => self.ocr_duration,
            Stage::Detection => self.detection_duration,
            Stage::Classification => self.classification_duration,
            Stage::Color => self.color_duration,
        }
    }

    pub const fn set_stage_duration(&mut self, stage: Stage, duration: Option<f64>) {
        match stage {
            Stage::Ocr => self.ocr_duration = duration,
            Stage::Detection => self.detection_duration = duration,
            Stage::Classification => self.classification_duration = duration,
            Stage::Color => self.color_duration = duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_all_stages_pending() {
        let analysis = CreativeAnalysis::new("c1");
        for stage in Stage::ALL {
            assert_eq!(analysis.stage_status(stage), StageStatus::Pending);
            assert!(analysis.stage_started_at(stage).is_none());
            assert!(analysis.stage_duration(stage).is_none());
        }
        assert_eq!(analysis.overall_status, StageStatus::Pending);
    }

    #[test]
    fn stage_accessors_touch_only_their_own_fields() {
        let mut analysis = CreativeAnalysis::new("c1");
        analysis.set_stage_status(Stage::Detection, StageStatus::Error);
        analysis.set_stage_duration(Stage::Detection, Some(1.25));

        assert_eq!(analysis.detection_status, StageStatus::Error);
        assert_eq!(analysis.detection_duration, Some(1.25));
        assert_eq!(analysis.ocr_status, StageStatus::Pending);
        assert_eq!(analysis.color_status, StageStatus::Pending);
        assert!(analysis.classification_duration.is_none());
    }

    #[test]
    fn stage_status_round_trips_through_db_repr() {
        for status in [
            StageStatus::Pending,
            StageStatus::Processing,
            StageStatus::Success,
            StageStatus::Error,
        ] {
            assert_eq!(StageStatus::from_db(status.as_str()), status);
        }
        assert_eq!(StageStatus::from_db("garbage"), StageStatus::Pending);
    }
}
