//! Workflow execution queries.
//!
//! Claiming and every state transition are single conditional updates:
//! a zero-row result means another worker won or the row moved on, and
//! the caller must drop the work item rather than force it.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::{NewExecution, WorkflowExecution};
use crate::db::DbPool;
use crate::error::EngineResult;

/// Insert an execution for a fired trigger.
///
/// Returns `None` when the dedupe key already exists, i.e. the trigger
/// already created an execution for this entity.
pub async fn insert_execution(
    pool: &DbPool,
    new: &NewExecution,
) -> EngineResult<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO workflow_execution (
            id, tenant_id, definition_id, subject_kind, subject_id, dedupe_key,
            status, current_step_id, context, attempts, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, 0, $9, $9)
        ON CONFLICT (dedupe_key) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.tenant_id)
    .bind(new.definition_id)
    .bind(&new.subject_kind)
    .bind(new.subject_id)
    .bind(&new.dedupe_key)
    .bind(&new.entry_step_id)
    .bind(&new.context)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id,)| id))
}

/// Get an execution by id within a tenant.
pub async fn get_execution(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
) -> EngineResult<Option<WorkflowExecution>> {
    let execution = sqlx::query_as::<_, WorkflowExecution>(
        r#"
        SELECT id, tenant_id, definition_id, subject_kind, subject_id, dedupe_key,
               status, current_step_id, context, error, attempts,
               scheduled_at, last_processed_at, created_at, updated_at
        FROM workflow_execution
        WHERE id = $1 AND tenant_id = $2
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(execution)
}

/// Claim a batch of due executions in one atomic update.
///
/// Selects `pending`/`running` rows whose claim marker is absent or
/// older than `stale_secs`, stamps `last_processed_at`, and returns the
/// claimed rows. `FOR UPDATE SKIP LOCKED` keeps concurrent workers off
/// each other's batches.
pub async fn claim_batch(
    pool: &DbPool,
    stale_secs: f64,
    limit: i64,
) -> EngineResult<Vec<WorkflowExecution>> {
    let executions = sqlx::query_as::<_, WorkflowExecution>(
        r#"
        UPDATE workflow_execution
        SET last_processed_at = NOW(), updated_at = NOW()
        WHERE id IN (
            SELECT id FROM workflow_execution
            WHERE status IN ('pending', 'running')
              AND (last_processed_at IS NULL
                   OR last_processed_at < NOW() - make_interval(secs => $1))
            ORDER BY updated_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, tenant_id, definition_id, subject_kind, subject_id, dedupe_key,
                  status, current_step_id, context, error, attempts,
                  scheduled_at, last_processed_at, created_at, updated_at
        "#,
    )
    .bind(stale_secs)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(executions)
}

/// Claim a single execution. Returns false when another worker holds a
/// fresh claim or the execution is no longer claimable.
pub async fn claim_execution(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
    stale_secs: f64,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET last_processed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
          AND status IN ('pending', 'running')
          AND (last_processed_at IS NULL
               OR last_processed_at < NOW() - make_interval(secs => $3))
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .bind(stale_secs)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Resume waiting executions whose due time has passed, claiming them
/// in the same statement.
pub async fn resume_due(pool: &DbPool, limit: i64) -> EngineResult<Vec<WorkflowExecution>> {
    let executions = sqlx::query_as::<_, WorkflowExecution>(
        r#"
        UPDATE workflow_execution
        SET status = 'running', scheduled_at = NULL,
            last_processed_at = NOW(), updated_at = NOW()
        WHERE id IN (
            SELECT id FROM workflow_execution
            WHERE status = 'waiting' AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, tenant_id, definition_id, subject_kind, subject_id, dedupe_key,
                  status, current_step_id, context, error, attempts,
                  scheduled_at, last_processed_at, created_at, updated_at
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(executions)
}

/// Resume one waiting execution whose due time has passed.
///
/// Self-checking: delivering the same resume job twice, or delivering
/// it early, matches zero rows and is a no-op.
pub async fn resume_execution(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = 'running', scheduled_at = NULL, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
          AND status = 'waiting' AND scheduled_at <= NOW()
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// First processing: move a pending execution to running.
pub async fn mark_running(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = 'running', updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND status = 'pending'
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Advance a running execution to its next step, resetting the retry
/// counter. Guarded on the current step so a stale worker cannot
/// overwrite a newer transition.
pub async fn advance_step(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
    from_step: &str,
    to_step: &str,
    context: &serde_json::Value,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET current_step_id = $3, attempts = 0, error = NULL,
            context = $4, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
          AND status = 'running' AND current_step_id = $5
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .bind(to_step)
    .bind(context)
    .bind(from_step)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Park a running execution on its current step until `resume_at`.
pub async fn mark_waiting(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
    step_id: &str,
    resume_at: DateTime<Utc>,
    context: &serde_json::Value,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = 'waiting', scheduled_at = $3, context = $4, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
          AND status = 'running' AND current_step_id = $5
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .bind(resume_at)
    .bind(context)
    .bind(step_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Complete a running execution, clearing its step pointer.
pub async fn mark_completed(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
    context: &serde_json::Value,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = 'completed', current_step_id = NULL, scheduled_at = NULL,
            context = $3, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND status = 'running'
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .bind(context)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail an execution, recording the reason.
pub async fn mark_failed(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
    error: &str,
    context: &serde_json::Value,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = 'failed', current_step_id = NULL, scheduled_at = NULL,
            error = $3, context = $4, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
          AND status IN ('pending', 'running', 'waiting')
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .bind(error)
    .bind(context)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record a failed action attempt, leaving the execution running for a
/// later retry.
pub async fn record_attempt(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
    attempts: i32,
    error: &str,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET attempts = $3, error = $4, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND status = 'running'
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .bind(attempts)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Cancel an execution from any non-terminal state.
pub async fn cancel_execution(
    pool: &DbPool,
    tenant_id: Uuid,
    execution_id: Uuid,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = 'cancelled', current_step_id = NULL, scheduled_at = NULL,
            updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
          AND status NOT IN ('completed', 'failed', 'cancelled')
        "#,
    )
    .bind(execution_id)
    .bind(tenant_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
