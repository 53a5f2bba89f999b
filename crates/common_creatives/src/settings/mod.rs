mod get_settings;
mod structs;

pub use get_settings::{bucket_dir, load_app_settings, scratch_dir, settings};
pub use structs::*;
