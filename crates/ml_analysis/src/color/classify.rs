use crate::color::clusterer::{ColorExtraction, round2};
use crate::color::palette::{BLACK_ENTRY, PALETTE, PaletteEntry, nearest_entry, rgb_to_hsv01};
use common_creatives::PaletteShare;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Very dark samples are perceptually black regardless of hue noise.
const DARK_VALUE_PERCENT: f64 = 15.0;
/// Desaturated samples snap to the gray ramp instead of a noisy hue.
const LOW_SATURATION_PERCENT: f64 = 15.0;

/// Maps extracted colors onto the reference palette and accumulates their
/// coverage per semantic class.
///
/// Samples resolving to the same class have their percentages summed; the
/// class hex is the last resolved palette hex. The function is total: a
/// malformed sample (empty hex) is skipped with a warning, and there is no
/// failure path that reaches the caller.
#[must_use]
pub fn classify_by_palette(extraction: &ColorExtraction) -> BTreeMap<String, PaletteShare> {
    let mut classified: BTreeMap<String, PaletteShare> = BTreeMap::new();

    for sample in extraction.all_samples() {
        if sample.hex.is_empty() {
            warn!("Skipping color sample without hex data: {sample:?}");
            continue;
        }

        let entry = resolve_palette_entry(sample.rgb);
        debug!(
            "Color {} ({}%) -> palette {} -> class {}",
            sample.hex, sample.percent, entry.hex, entry.class
        );

        let share = classified
            .entry(entry.class.as_str().to_string())
            .or_insert(PaletteShare { hex: String::new(), percent: 0.0 });
        share.percent += sample.percent;
        share.hex = format!("#{}", entry.hex);
    }

    for share in classified.values_mut() {
        share.percent = round2(share.percent);
    }
    classified
}

/// Decision rules, in priority order: dark override, gray-ramp snap,
/// nearest colored entry.
fn resolve_palette_entry(rgb: [u8; 3]) -> &'static PaletteEntry {
    let hsv = rgb_to_hsv01(rgb);
    let saturation_percent = hsv[1] * 100.0;
    let value_percent = hsv[2] * 100.0;

    if value_percent <= DARK_VALUE_PERCENT {
        &PALETTE[BLACK_ENTRY]
    } else if saturation_percent <= LOW_SATURATION_PERCENT {
        nearest_entry(hsv, true)
    } else {
        nearest_entry(hsv, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::palette::{ColorClass, rgb_to_hex};
    use common_creatives::ColorSample;

    fn sample(rgb: [u8; 3], percent: f64) -> ColorSample {
        ColorSample { rgb, hex: rgb_to_hex(rgb), percent }
    }

    fn extraction(dominant: Vec<ColorSample>, secondary: Vec<ColorSample>) -> ColorExtraction {
        ColorExtraction { dominant_colors: dominant, secondary_colors: secondary }
    }

    #[test]
    fn classification_is_total_over_the_class_set() {
        // A sweep over RGB space always lands on one of the 17 classes.
        for r in (0..=255).step_by(51) {
            for g in (0..=255).step_by(51) {
                for b in (0..=255).step_by(51) {
                    let result = classify_by_palette(&extraction(
                        vec![sample([r as u8, g as u8, b as u8], 10.0)],
                        vec![],
                    ));
                    assert_eq!(result.len(), 1);
                    let class = result.keys().next().unwrap();
                    assert!(
                        ColorClass::from_name(class).is_some(),
                        "unknown class {class} for rgb ({r},{g},{b})"
                    );
                }
            }
        }
    }

    #[test]
    fn very_dark_samples_are_black_regardless_of_hue() {
        for rgb in [[10, 5, 8], [38, 0, 0], [0, 20, 35], [25, 25, 25]] {
            let result = classify_by_palette(&extraction(vec![sample(rgb, 50.0)], vec![]));
            let (class, share) = result.iter().next().unwrap();
            assert_eq!(class, "Black", "rgb {rgb:?}");
            assert_eq!(share.hex, "#000000");
        }
    }

    #[test]
    fn desaturated_samples_snap_to_the_gray_ramp() {
        let result = classify_by_palette(&extraction(vec![sample([200, 198, 202], 40.0)], vec![]));
        let (class, share) = result.iter().next().unwrap();
        assert_eq!(class, "Light Gray");
        assert_eq!(share.hex, "#bfbfbf");
    }

    #[test]
    fn saturated_samples_resolve_to_colored_entries() {
        let result = classify_by_palette(&extraction(vec![sample([250, 10, 10], 60.0)], vec![]));
        assert!(result.contains_key("Red"));

        let result = classify_by_palette(&extraction(vec![sample([30, 30, 220], 60.0)], vec![]));
        assert!(result.contains_key("Blue"));
    }

    #[test]
    fn repeated_classes_sum_percentages_and_keep_last_hex() {
        let result = classify_by_palette(&extraction(
            vec![sample([255, 0, 0], 30.0)],
            vec![sample([128, 0, 0], 12.5)],
        ));
        let share = &result["Red"];
        assert!((share.percent - 42.5).abs() < 0.01);
        // Second sample resolved last, so its palette hex wins.
        assert_eq!(share.hex, "#800000");
    }

    #[test]
    fn percent_totals_are_conserved() {
        let inputs = vec![
            sample([255, 0, 0], 25.5),
            sample([0, 255, 0], 30.25),
            sample([10, 5, 8], 20.0),
            sample([200, 198, 202], 14.25),
        ];
        let input_total: f64 = inputs.iter().map(|s| s.percent).sum();

        let result = classify_by_palette(&extraction(inputs, vec![]));
        let output_total: f64 = result.values().map(|s| s.percent).sum();
        #[allow(clippy::cast_precision_loss)]
        let tolerance = 0.01 * result.len() as f64;
        assert!((input_total - output_total).abs() <= tolerance);
    }

    #[test]
    fn malformed_samples_are_skipped() {
        let mut bad = sample([255, 0, 0], 10.0);
        bad.hex = String::new();
        let result = classify_by_palette(&extraction(vec![bad, sample([0, 0, 255], 5.0)], vec![]));
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("Blue"));
    }

    #[test]
    fn empty_extraction_yields_empty_map() {
        assert!(classify_by_palette(&ColorExtraction::empty()).is_empty());
    }
}
