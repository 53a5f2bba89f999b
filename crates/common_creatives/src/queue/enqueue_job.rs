use color_eyre::Result;
use sqlx::PgPool;

/// Queues a creative for analysis. Re-submitting an already-queued creative
/// is a no-op; the pipeline itself is idempotent for completed ones.
///
/// # Errors
///
/// * The insert fails (e.g. the creative row does not exist).
pub async fn enqueue_analysis_job(pool: &PgPool, creative_id: &str, priority: i32) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO jobs (creative_id, priority)
        SELECT $1, $2
        WHERE NOT EXISTS (SELECT 1 FROM jobs WHERE creative_id = $1 AND status = 'queued')
        ",
    )
    .bind(creative_id)
    .bind(priority)
    .execute(pool)
    .await?;
    Ok(())
}

/// Cancels any queued jobs for a creative, used when it is deleted before a
/// worker picks it up.
///
/// # Errors
///
/// * The update fails.
pub async fn cancel_queued_jobs(pool: &PgPool, creative_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r"
        UPDATE jobs
        SET status = 'cancelled'
        WHERE creative_id = $1
          AND status = 'queued'
        ",
    )
    .bind(creative_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
