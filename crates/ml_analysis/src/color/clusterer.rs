use crate::color::palette::rgb_to_hex;
use common_creatives::ColorSample;
use image::imageops::FilterType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::{debug, warn};

/// Tuning for [`extract_top_colors`]. The defaults reproduce the production
/// configuration; the fixed seed keeps cluster assignment reproducible run
/// to run.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub resize: (u32, u32),
    /// Over-sampling coefficient for the cluster count, so noisy small
    /// clusters can be discarded by the dominant/secondary split.
    pub coeff: f64,
    pub seed: u64,
    pub n_init: u32,
    pub max_iter: u32,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            resize: (300, 300),
            coeff: 1.7,
            seed: 42,
            n_init: 10,
            max_iter: 100,
        }
    }
}

/// Ordered dominant/secondary color lists for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorExtraction {
    pub dominant_colors: Vec<ColorSample>,
    pub secondary_colors: Vec<ColorSample>,
}

impl ColorExtraction {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Dominant followed by secondary samples.
    pub fn all_samples(&self) -> impl Iterator<Item = &ColorSample> {
        self.dominant_colors.iter().chain(self.secondary_colors.iter())
    }
}

/// Extracts the top colors of an image by pixel clustering.
///
/// Returns up to `n_dominant` + `n_secondary` samples ordered by descending
/// pixel coverage. Color data is supplementary, so this never fails: decode
/// or clustering problems are logged and degrade to two empty lists.
#[must_use]
pub fn extract_top_colors(
    image_path: &Path,
    n_dominant: usize,
    n_secondary: usize,
    options: &ClusterOptions,
) -> ColorExtraction {
    if n_dominant + n_secondary == 0 {
        warn!("0 color clusters requested, returning empty lists");
        return ColorExtraction::empty();
    }
    match try_extract(image_path, n_dominant, n_secondary, options) {
        Ok(extraction) => extraction,
        Err(err) => {
            warn!("Color extraction failed for {}: {err}", image_path.display());
            ColorExtraction::empty()
        }
    }
}

fn try_extract(
    image_path: &Path,
    n_dominant: usize,
    n_secondary: usize,
    options: &ClusterOptions,
) -> color_eyre::Result<ColorExtraction> {
    let (width, height) = options.resize;
    let image = image::open(image_path)?
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8();

    let pixels: Vec<[f64; 3]> = image
        .pixels()
        .map(|p| [f64::from(p.0[0]), f64::from(p.0[1]), f64::from(p.0[2])])
        .collect();
    let total_pixels = pixels.len();

    let requested = n_dominant + n_secondary;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let k = (((requested as f64) * options.coeff).round() as usize).min(total_pixels);
    if k == 0 {
        return Ok(ColorExtraction::empty());
    }
    debug!("Clustering {total_pixels} pixels into k={k}");

    let (centroids, counts) = kmeans(&pixels, k, options);

    // Sort clusters by coverage, largest first. Oversampling can leave
    // clusters with no members; those carry no color information.
    let mut order: Vec<usize> = (0..centroids.len()).filter(|&c| counts[c] > 0).collect();
    order.sort_by(|&a, &b| counts[b].cmp(&counts[a]));

    let mut all_colors = Vec::with_capacity(centroids.len());
    for cluster in order {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rgb = [
            centroids[cluster][0].round().clamp(0.0, 255.0) as u8,
            centroids[cluster][1].round().clamp(0.0, 255.0) as u8,
            centroids[cluster][2].round().clamp(0.0, 255.0) as u8,
        ];
        #[allow(clippy::cast_precision_loss)]
        let percent = round2(counts[cluster] as f64 / total_pixels as f64 * 100.0);
        all_colors.push(ColorSample { rgb, hex: rgb_to_hex(rgb), percent });
    }

    let secondary_colors = all_colors
        .get(n_dominant..(n_dominant + n_secondary).min(all_colors.len()))
        .unwrap_or_default()
        .to_vec();
    all_colors.truncate(n_dominant);

    Ok(ColorExtraction { dominant_colors: all_colors, secondary_colors })
}

/// Lloyd's algorithm with k-means++ seeding, re-run `n_init` times from
/// deterministic seeds; the lowest-inertia run wins.
fn kmeans(pixels: &[[f64; 3]], k: usize, options: &ClusterOptions) -> (Vec<[f64; 3]>, Vec<usize>) {
    let mut best: Option<(f64, Vec<[f64; 3]>, Vec<usize>)> = None;

    for init in 0..options.n_init {
        let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(u64::from(init)));
        let (centroids, counts, inertia) = kmeans_single(pixels, k, options.max_iter, &mut rng);
        if best.as_ref().is_none_or(|(best_inertia, _, _)| inertia < *best_inertia) {
            best = Some((inertia, centroids, counts));
        }
    }

    let (_, centroids, counts) = best.unwrap_or((0.0, Vec::new(), Vec::new()));
    (centroids, counts)
}

fn kmeans_single(
    pixels: &[[f64; 3]],
    k: usize,
    max_iter: u32,
    rng: &mut StdRng,
) -> (Vec<[f64; 3]>, Vec<usize>, f64) {
    let mut centroids = seed_centroids(pixels, k, rng);
    let mut assignment = vec![0usize; pixels.len()];

    for _ in 0..max_iter {
        let mut changed = false;
        for (i, pixel) in pixels.iter().enumerate() {
            let nearest = nearest_centroid(pixel, &centroids);
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (pixel, &cluster) in pixels.iter().zip(&assignment) {
            sums[cluster][0] += pixel[0];
            sums[cluster][1] += pixel[1];
            sums[cluster][2] += pixel[2];
            counts[cluster] += 1;
        }
        for (cluster, sum) in sums.iter().enumerate() {
            if counts[cluster] > 0 {
                #[allow(clippy::cast_precision_loss)]
                let n = counts[cluster] as f64;
                centroids[cluster] = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }

        if !changed {
            break;
        }
    }

    let mut counts = vec![0usize; k];
    let mut inertia = 0.0;
    for (pixel, &cluster) in pixels.iter().zip(&assignment) {
        counts[cluster] += 1;
        inertia += distance_sq(pixel, &centroids[cluster]);
    }
    (centroids, counts, inertia)
}

/// k-means++ seeding: first center uniform, later centers sampled
/// proportionally to squared distance from the nearest chosen center.
fn seed_centroids(pixels: &[[f64; 3]], k: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(pixels[rng.random_range(0..pixels.len())]);

    let mut distances: Vec<f64> = pixels
        .iter()
        .map(|p| distance_sq(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = distances.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.random_range(0.0..total);
            let mut chosen = pixels.len() - 1;
            for (i, d) in distances.iter().enumerate() {
                target -= d;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            pixels[chosen]
        } else {
            // All remaining points coincide with a chosen center.
            pixels[rng.random_range(0..pixels.len())]
        };
        centroids.push(next);
        for (i, pixel) in pixels.iter().enumerate() {
            let d = distance_sq(pixel, &next);
            if d < distances[i] {
                distances[i] = d;
            }
        }
    }
    centroids
}

fn nearest_centroid(pixel: &[f64; 3], centroids: &[[f64; 3]]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let dist = distance_sq(pixel, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

fn distance_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    /// Small options so tests stay fast; the algorithm is unchanged.
    fn test_options() -> ClusterOptions {
        ClusterOptions {
            resize: (40, 40),
            n_init: 3,
            max_iter: 50,
            ..ClusterOptions::default()
        }
    }

    /// Writes a 40x40 image split into four equal vertical color bands.
    fn four_band_image(dir: &TempDir) -> std::path::PathBuf {
        let bands = [
            Rgb([255u8, 0, 0]),
            Rgb([0, 255, 0]),
            Rgb([0, 0, 255]),
            Rgb([255, 255, 255]),
        ];
        let img = RgbImage::from_fn(40, 40, |x, _| bands[(x / 10) as usize]);
        let path = dir.path().join("bands.png");
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn respects_dominant_and_secondary_bounds() {
        let dir = TempDir::new().unwrap();
        let path = four_band_image(&dir);

        let extraction = extract_top_colors(&path, 3, 3, &test_options());
        assert!(extraction.dominant_colors.len() <= 3);
        assert!(extraction.dominant_colors.len() + extraction.secondary_colors.len() <= 6);
        assert!(!extraction.dominant_colors.is_empty());
    }

    #[test]
    fn zero_requested_clusters_returns_empty_lists() {
        let dir = TempDir::new().unwrap();
        let path = four_band_image(&dir);

        let extraction = extract_top_colors(&path, 0, 0, &test_options());
        assert_eq!(extraction, ColorExtraction::empty());
    }

    #[test]
    fn unreadable_image_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-an-image.png");
        std::fs::write(&path, b"junk").unwrap();

        let extraction = extract_top_colors(&path, 3, 3, &test_options());
        assert_eq!(extraction, ColorExtraction::empty());

        let missing = dir.path().join("missing.png");
        assert_eq!(extract_top_colors(&missing, 3, 3, &test_options()), ColorExtraction::empty());
    }

    #[test]
    fn single_color_image_yields_one_full_cluster() {
        let dir = TempDir::new().unwrap();
        let img = RgbImage::from_pixel(40, 40, Rgb([10u8, 200, 30]));
        let path = dir.path().join("solid.png");
        img.save(&path).unwrap();

        let extraction = extract_top_colors(&path, 2, 2, &test_options());
        let top = &extraction.dominant_colors[0];
        assert_eq!(top.rgb, [10, 200, 30]);
        assert!((top.percent - 100.0).abs() < 0.01);
    }

    #[test]
    fn percentages_are_ordered_and_sum_to_about_100() {
        let dir = TempDir::new().unwrap();
        let path = four_band_image(&dir);

        let extraction = extract_top_colors(&path, 4, 4, &test_options());
        let samples: Vec<_> = extraction.all_samples().collect();
        for pair in samples.windows(2) {
            assert!(pair[0].percent >= pair[1].percent);
        }
        let sum: f64 = samples.iter().map(|s| s.percent).sum();
        assert!(sum <= 100.01);
        assert!(sum > 99.0 - 0.5, "covered {sum}%");
    }

    #[test]
    fn extraction_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = four_band_image(&dir);

        let a = extract_top_colors(&path, 3, 3, &test_options());
        let b = extract_top_colors(&path, 3, 3, &test_options());
        assert_eq!(a, b);
    }
}
