mod enqueue_job;
mod structs;

pub use enqueue_job::{cancel_queued_jobs, enqueue_analysis_job};
pub use structs::{Job, JobStatus};
