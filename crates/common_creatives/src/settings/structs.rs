use serde::Deserialize;

/// Overall application configuration structure.
#[derive(Debug, Deserialize)]
pub struct AppSettings {
    pub directories: DirectoriesSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub worker: WorkerSettings,
    pub inference: InferenceSettings,
    pub pipeline: PipelineSettings,
    pub color_analysis: ColorAnalysisSettings,
}

/// Defines paths for the creatives bucket and pipeline scratch space.
#[derive(Debug, Deserialize)]
pub struct DirectoriesSettings {
    /// Folder acting as the object-store bucket with uploaded originals.
    pub bucket_folder: String,
    /// Folder for images downloaded for the duration of one pipeline run.
    pub scratch_folder: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

/// Database connection and pool configuration.
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: u64,
    pub idle_timeout: u64,
    pub acquire_timeout: u64,
}

/// Configuration for the background worker process.
#[derive(Debug, Deserialize)]
pub struct WorkerSettings {
    pub wait_after_empty_queue_s: u64,
    /// How many times one pipeline run is attempted before giving up.
    pub max_attempts: u32,
    /// Fixed sleep between attempts, seconds.
    pub retry_backoff_s: u64,
    /// Safety-net bound on a single attempt, seconds.
    pub processing_timeout_s: u64,
}

/// Where the inference sidecar lives.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceSettings {
    pub base_url: String,
    pub request_timeout_s: u64,
}

/// Static pipeline tuning.
#[derive(Debug, Deserialize)]
pub struct PipelineSettings {
    pub detection_confidence_threshold: f64,
    pub max_detections: usize,
}

/// Static color-extraction tuning; the dominant/secondary counts themselves
/// are runtime settings served from the database.
#[derive(Debug, Deserialize)]
pub struct ColorAnalysisSettings {
    pub resize_width: u32,
    pub resize_height: u32,
    pub cluster_coeff: f64,
}
