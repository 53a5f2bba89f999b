//! Aggregation over completed analysis records.
//!
//! Callers hand in records already filtered to overall SUCCESS; groups may
//! still be partially processed at query time, so every function tolerates
//! records with missing signals.

use common_creatives::CreativeAnalysis;
use ml_analysis::TOPICS;
use ml_analysis::color::ColorClass;
use serde::Serialize;
use std::collections::BTreeMap;

/// Group-wide confidence averages.
///
/// Averages divide by the total record count: a record lacking a signal
/// contributes 0 to the sum and depresses the average. That matches the
/// shipped dashboard numbers and is kept on purpose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub total_creatives: usize,
    pub avg_ocr_confidence: f64,
    pub avg_object_confidence: f64,
    pub avg_topic_confidence: f64,
}

/// Per-topic slice of the same confidence metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicStats {
    pub topic: String,
    pub count: usize,
    pub avg_ocr_confidence: f64,
    pub avg_object_confidence: f64,
    pub avg_topic_confidence: f64,
}

/// One row of a per-topic color chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicColorShare {
    pub class: String,
    pub hex: String,
    pub percent: f64,
}

/// Mean confidence over a record's OCR blocks, 0 when it has none.
fn record_ocr_confidence(analysis: &CreativeAnalysis) -> f64 {
    mean(analysis.ocr_blocks.iter().map(|b| b.confidence))
}

/// Mean confidence over a record's detections, 0 when it has none.
fn record_object_confidence(analysis: &CreativeAnalysis) -> f64 {
    mean(analysis.detected_objects.iter().map(|o| o.confidence))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let count = count as f64;
        sum / count
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Global confidence averages over the given records.
#[must_use]
pub fn group_summary(analyses: &[CreativeAnalysis]) -> GroupSummary {
    let total = analyses.len();
    if total == 0 {
        return GroupSummary {
            total_creatives: 0,
            avg_ocr_confidence: 0.0,
            avg_object_confidence: 0.0,
            avg_topic_confidence: 0.0,
        };
    }

    let ocr_sum: f64 = analyses.iter().map(record_ocr_confidence).sum();
    let object_sum: f64 = analyses.iter().map(record_object_confidence).sum();
    let topic_sum: f64 = analyses.iter().filter_map(|a| a.topic_confidence).sum();

    #[allow(clippy::cast_precision_loss)]
    let divisor = total as f64;
    GroupSummary {
        total_creatives: total,
        avg_ocr_confidence: round2(ocr_sum / divisor),
        avg_object_confidence: round2(object_sum / divisor),
        avg_topic_confidence: round2(topic_sum / divisor),
    }
}

/// Confidence metrics bucketed by main topic, in the fixed topic order.
/// Topics nothing resolved to are omitted.
#[must_use]
pub fn topic_stats(analyses: &[CreativeAnalysis]) -> Vec<TopicStats> {
    TOPICS
        .iter()
        .filter_map(|&topic| {
            let records: Vec<_> = analyses
                .iter()
                .filter(|a| a.main_topic.as_deref() == Some(topic))
                .collect();
            if records.is_empty() {
                return None;
            }
            #[allow(clippy::cast_precision_loss)]
            let count = records.len() as f64;
            let ocr_sum: f64 = records.iter().map(|a| record_ocr_confidence(a)).sum();
            let object_sum: f64 = records.iter().map(|a| record_object_confidence(a)).sum();
            let topic_sum: f64 = records.iter().filter_map(|a| a.topic_confidence).sum();
            Some(TopicStats {
                topic: topic.to_string(),
                count: records.len(),
                avg_ocr_confidence: round2(ocr_sum / count),
                avg_object_confidence: round2(object_sum / count),
                avg_topic_confidence: round2(topic_sum / count),
            })
        })
        .collect()
}

/// How often each dominant-color hex shows up across the records.
#[must_use]
pub fn dominant_color_counts(analyses: &[CreativeAnalysis]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for analysis in analyses {
        for color in &analysis.dominant_colors {
            if !color.hex.is_empty() {
                *counts.entry(color.hex.clone()).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Summed palette coverage per semantic class across all records. Entries
/// with class names outside the fixed class set are skipped.
#[must_use]
pub fn color_class_distribution(analyses: &[CreativeAnalysis]) -> BTreeMap<String, f64> {
    let mut distribution = BTreeMap::new();
    for analysis in analyses {
        for (class_name, share) in &analysis.palette_colors {
            if ColorClass::from_name(class_name).is_some() {
                *distribution.entry(class_name.clone()).or_insert(0.0) += share.percent;
            }
        }
    }
    distribution
}

/// Per-topic color distribution for the dashboard: palette coverage summed
/// per class within each topic, cut to the `top_n` largest classes and
/// re-normalized so the displayed shares sum to 100. When every kept share
/// is zero the shares are distributed equally instead.
#[must_use]
pub fn topic_color_distribution(
    analyses: &[CreativeAnalysis],
    top_n: usize,
) -> BTreeMap<String, Vec<TopicColorShare>> {
    let mut per_topic: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();

    for analysis in analyses {
        let Some(topic) = analysis.main_topic.as_ref() else {
            continue;
        };
        let colors = per_topic.entry(topic.clone()).or_default();
        for (class_name, share) in &analysis.palette_colors {
            if ColorClass::from_name(class_name).is_some() {
                *colors.entry(class_name.clone()).or_insert(0.0) += share.percent;
            }
        }
    }

    per_topic
        .into_iter()
        .map(|(topic, colors)| {
            let mut sorted: Vec<(String, f64)> = colors.into_iter().collect();
            sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            sorted.truncate(top_n);

            let total: f64 = sorted.iter().map(|(_, percent)| percent).sum();
            #[allow(clippy::cast_precision_loss)]
            let uniform = if sorted.is_empty() { 0.0 } else { 100.0 / sorted.len() as f64 };

            let shares = sorted
                .into_iter()
                .map(|(class_name, percent)| {
                    let hex = ColorClass::from_name(&class_name)
                        .map_or("#CCCCCC", ColorClass::display_hex);
                    let normalized = if total > 0.0 { percent / total * 100.0 } else { uniform };
                    TopicColorShare {
                        class: class_name,
                        hex: hex.to_string(),
                        percent: normalized,
                    }
                })
                .collect();
            (topic, shares)
        })
        .collect()
}

/// Wall-clock processing span of a group: latest completion minus earliest
/// OCR start, with the record count. Records missing either timestamp stay
/// out of the min/max but still count.
#[must_use]
pub fn group_processing_time(analyses: &[CreativeAnalysis]) -> (f64, usize) {
    if analyses.is_empty() {
        return (0.0, 0);
    }

    let min_start = analyses.iter().filter_map(|a| a.ocr_started_at).min();
    let max_end = analyses.iter().filter_map(|a| a.analysis_timestamp).max();

    match (min_start, max_end) {
        (Some(start), Some(end)) => ((end - start).as_seconds_f64(), analyses.len()),
        _ => (0.0, analyses.len()),
    }
}
