//! Workflow definition queries.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::WorkflowDefinition;
use crate::db::DbPool;
use crate::error::EngineResult;

/// Get a definition by id within a tenant.
pub async fn get_definition(
    pool: &DbPool,
    tenant_id: Uuid,
    definition_id: Uuid,
) -> EngineResult<Option<WorkflowDefinition>> {
    let definition = sqlx::query_as::<_, WorkflowDefinition>(
        r#"
        SELECT id, tenant_id, name, version, active, trigger, spec,
               last_checked_at, created_at, updated_at
        FROM workflow_definition
        WHERE id = $1 AND tenant_id = $2
        "#,
    )
    .bind(definition_id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(definition)
}

/// List active definitions with an event trigger, across all tenants.
///
/// The trigger evaluator runs one scan per definition; tenant scoping
/// happens inside each scan via the definition's own tenant id.
pub async fn list_event_definitions(pool: &DbPool) -> EngineResult<Vec<WorkflowDefinition>> {
    let definitions = sqlx::query_as::<_, WorkflowDefinition>(
        r#"
        SELECT id, tenant_id, name, version, active, trigger, spec,
               last_checked_at, created_at, updated_at
        FROM workflow_definition
        WHERE active AND trigger->>'kind' = 'event'
        ORDER BY tenant_id, name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(definitions)
}

/// List active definitions with an interval trigger, across all tenants.
pub async fn list_interval_definitions(pool: &DbPool) -> EngineResult<Vec<WorkflowDefinition>> {
    let definitions = sqlx::query_as::<_, WorkflowDefinition>(
        r#"
        SELECT id, tenant_id, name, version, active, trigger, spec,
               last_checked_at, created_at, updated_at
        FROM workflow_definition
        WHERE active AND trigger->>'kind' = 'interval'
        ORDER BY tenant_id, name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(definitions)
}

/// Advance a definition's event-scan cursor.
///
/// GREATEST keeps the cursor monotonic when two workers scan the same
/// definition concurrently.
pub async fn advance_scan_cursor(
    pool: &DbPool,
    tenant_id: Uuid,
    definition_id: Uuid,
    to: DateTime<Utc>,
) -> EngineResult<()> {
    sqlx::query(
        r#"
        UPDATE workflow_definition
        SET last_checked_at = GREATEST(COALESCE(last_checked_at, to_timestamp(0)), $3),
            updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
        "#,
    )
    .bind(definition_id)
    .bind(tenant_id)
    .bind(to)
    .execute(pool)
    .await?;

    Ok(())
}
