use color_eyre::Result;
use common_creatives::{Job, alert};
use sqlx::PgPool;
use tracing::warn;

/// Atomically claims the next queued job, skipping rows other workers hold.
///
/// # Errors
///
/// * The claim query fails.
pub async fn claim_next_job(pool: &PgPool, worker_id: &str) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(
        r"
        WITH candidate AS (
            SELECT id
            FROM jobs
            WHERE status = 'queued' AND scheduled_at <= now()
            ORDER BY priority, scheduled_at, created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE jobs
        SET status = 'running',
            owner = $1,
            started_at = now()
        WHERE id = (SELECT id FROM candidate)
        RETURNING id, creative_id, priority, attempts
        ",
    )
    .bind(worker_id)
    .fetch_optional(pool)
    .await?;
    Ok(job)
}

/// # Errors
///
/// * The update fails.
pub async fn mark_job_done(pool: &PgPool, job_id: i64) -> Result<()> {
    sqlx::query(
        r"
        UPDATE jobs
        SET status = 'done',
            finished_at = now(),
            attempts = attempts + 1
        WHERE id = $1
        ",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// # Errors
///
/// * The update fails.
pub async fn mark_job_failed(pool: &PgPool, job_id: i64, last_error: &str) -> Result<()> {
    alert!("‼️ Marking job {} as failed: {}", job_id, last_error);
    sqlx::query(
        r"
        UPDATE jobs
        SET status = 'failed',
            finished_at = now(),
            last_error = $2,
            attempts = attempts + 1
        WHERE id = $1
        ",
    )
    .bind(job_id)
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(())
}
