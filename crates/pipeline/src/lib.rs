mod orchestrator;
mod stages;
mod store;

pub use orchestrator::{PipelineContext, PipelineOptions, RunOutcome, run_pipeline, run_with_retry};
pub use store::{
    AnalysisStore, DOMINANT_COLORS_COUNT, ImageStore, RuntimeSettings, SECONDARY_COLORS_COUNT,
};
