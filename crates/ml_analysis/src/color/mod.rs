mod classify;
mod clusterer;
mod palette;

pub use classify::classify_by_palette;
pub use clusterer::{ClusterOptions, ColorExtraction, extract_top_colors};
pub use palette::{ColorClass, PaletteEntry, nearest_entry, parse_hex, rgb_to_hex, rgb_to_hsv01};
