use crate::db_model::{Creative, CreativeAnalysis, Stage, StageStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Formats one stage cell for the status table.
///
/// The trailing space on the PROCESSING variant is load-bearing: the UI
/// distinguishes finished from in-flight cells by it when picking colors.
#[must_use]
pub fn format_stage_status(
    status: StageStatus,
    started_at: Option<DateTime<Utc>>,
    duration: Option<f64>,
    now: DateTime<Utc>,
) -> String {
    match status {
        StageStatus::Success => match duration {
            Some(duration) => format!("{duration:.1} sec"),
            None => "—".to_string(),
        },
        StageStatus::Processing => match started_at {
            Some(started) => {
                let elapsed = (now - started).as_seconds_f64();
                format!("{elapsed:.1} sec ")
            }
            None => "—".to_string(),
        },
        StageStatus::Error => "X".to_string(),
        StageStatus::Pending => "—".to_string(),
    }
}

/// Per-creative processing status, formatted for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub creative_id: String,
    pub original_filename: String,
    pub file_size: i64,
    pub image_size: String,
    pub upload_timestamp: DateTime<Utc>,
    pub main_topic: Option<String>,
    pub topic_confidence: Option<f64>,
    /// `"<stage>_status"` → formatted cell, one entry per stage.
    pub stages: BTreeMap<String, String>,
    pub overall_status: String,
}

impl StatusReport {
    /// Assembles the report; an absent analysis record reads as all PENDING.
    #[must_use]
    pub fn build(creative: &Creative, analysis: Option<&CreativeAnalysis>, now: DateTime<Utc>) -> Self {
        let mut stages = BTreeMap::new();
        for stage in Stage::ALL {
            let formatted = match analysis {
                Some(analysis) => format_stage_status(
                    analysis.stage_status(stage),
                    analysis.stage_started_at(stage),
                    analysis.stage_duration(stage),
                    now,
                ),
                None => "—".to_string(),
            };
            stages.insert(format!("{}_status", stage.name()), formatted);
        }

        // The overall cell follows the same formatting but measures elapsed
        // time from the OCR stage start, the run's start marker.
        let overall_status = match analysis {
            Some(analysis) => format_stage_status(
                analysis.overall_status,
                analysis.ocr_started_at,
                analysis.total_duration,
                now,
            ),
            None => "—".to_string(),
        };

        Self {
            creative_id: creative.creative_id.clone(),
            original_filename: creative.original_filename.clone(),
            file_size: creative.file_size,
            image_size: format!("{}x{}", creative.image_width, creative.image_height),
            upload_timestamp: creative.upload_timestamp,
            main_topic: analysis.and_then(|a| a.main_topic.clone()),
            topic_confidence: analysis.and_then(|a| a.topic_confidence),
            stages,
            overall_status,
        }
    }
}
