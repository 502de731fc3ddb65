//! Scheduled job queries.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::{NewJob, ScheduledJob};
use crate::db::DbPool;
use crate::error::EngineResult;

/// Insert a scheduled job.
pub async fn insert_job(pool: &DbPool, new: &NewJob) -> EngineResult<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO scheduled_job (id, tenant_id, kind, execution_id, definition_id, run_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.tenant_id)
    .bind(new.kind.as_str())
    .bind(new.execution_id)
    .bind(new.definition_id)
    .bind(new.run_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Fetch due jobs, oldest first.
///
/// Creation order keeps jobs for the same execution in sequence so a
/// later wait cannot be resumed before an earlier one.
pub async fn due_jobs(pool: &DbPool, limit: i64) -> EngineResult<Vec<ScheduledJob>> {
    let jobs = sqlx::query_as::<_, ScheduledJob>(
        r#"
        SELECT id, tenant_id, kind, execution_id, definition_id, run_at, created_at
        FROM scheduled_job
        WHERE run_at <= NOW()
        ORDER BY created_at ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(jobs)
}

/// Delete a consumed job. Returns false when another worker already
/// deleted it.
pub async fn delete_job(pool: &DbPool, job_id: Uuid) -> EngineResult<bool> {
    let result = sqlx::query("DELETE FROM scheduled_job WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Ensure exactly one pending evaluation job exists for an interval
/// trigger. Returns true when a job was inserted.
///
/// `exclude_job` lets the scheduler re-arm the next window while the
/// job being consumed still exists (it is deleted only after success).
pub async fn ensure_trigger_job(
    pool: &DbPool,
    tenant_id: Uuid,
    definition_id: Uuid,
    run_at: DateTime<Utc>,
    exclude_job: Option<Uuid>,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO scheduled_job (id, tenant_id, kind, definition_id, run_at, created_at)
        SELECT $1, $2, 'evaluate_trigger', $3, $4, $5
        WHERE NOT EXISTS (
            SELECT 1 FROM scheduled_job
            WHERE kind = 'evaluate_trigger'
              AND definition_id = $3
              AND id IS DISTINCT FROM $6
        )
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(definition_id)
    .bind(run_at)
    .bind(Utc::now())
    .bind(exclude_job)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
