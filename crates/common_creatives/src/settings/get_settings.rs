use crate::settings::structs::AppSettings;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Resolve the settings file: `CREATIVES_CONFIG` env override first, then the
/// working directory, then the workspace root (for crate-local test runs).
fn config_file() -> PathBuf {
    if let Ok(path) = std::env::var("CREATIVES_CONFIG") {
        return PathBuf::from(path);
    }
    let local = PathBuf::from("config/settings.yaml");
    if local.exists() {
        return local;
    }
    PathBuf::from("../../config/settings.yaml")
}

/// Load the app settings from YAML + environment variables.
///
/// # Errors
///
/// * The settings file cannot be resolved or read.
/// * The merged configuration does not deserialize into [`AppSettings`].
pub fn load_app_settings() -> color_eyre::Result<AppSettings> {
    let config_path = config_file().canonicalize()?;

    let builder = config::Config::builder()
        .add_source(config::File::from(config_path))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        );
    Ok(builder.build()?.try_deserialize::<AppSettings>()?)
}

/// Immutable global settings, initialized on first access.
static SETTINGS: LazyLock<AppSettings> =
    LazyLock::new(|| load_app_settings().expect("Failed to load app settings"));

static BUCKET_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    std::path::absolute(&SETTINGS.directories.bucket_folder).expect("Invalid bucket dir")
});

static SCRATCH_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    std::path::absolute(&SETTINGS.directories.scratch_folder).expect("Invalid scratch dir")
});

#[must_use]
pub fn settings() -> &'static AppSettings {
    &SETTINGS
}

#[must_use]
pub fn bucket_dir() -> &'static Path {
    &BUCKET_DIR
}

#[must_use]
pub fn scratch_dir() -> &'static Path {
    &SCRATCH_DIR
}
