use sqlx::{FromRow, Type};

/// A claimed row from the `jobs` table.
#[derive(FromRow, Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub creative_id: String,
    pub priority: i32,
    pub attempts: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Failed,
    Done,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}
