//! Read-only scans over watched tenant tables.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::SourceRecord;
use crate::db::DbPool;
use crate::error::EngineResult;
use crate::workflow::SourceEntity;

/// Fetch rows of a watched table created after `since`, oldest first.
///
/// The table name comes from the [`SourceEntity`] enum, never from
/// user input. The full row is projected to JSON so trigger filters
/// can match any column.
pub async fn created_since(
    pool: &DbPool,
    entity: SourceEntity,
    tenant_id: Uuid,
    since: Option<DateTime<Utc>>,
    limit: i64,
) -> EngineResult<Vec<SourceRecord>> {
    let query = format!(
        r#"
        SELECT id, tenant_id, created_at, row_to_json(t)::jsonb AS attributes
        FROM {} t
        WHERE tenant_id = $1
          AND created_at > COALESCE($2, to_timestamp(0))
        ORDER BY created_at ASC
        LIMIT $3
        "#,
        entity.table()
    );

    let records = sqlx::query_as::<_, SourceRecord>(&query)
        .bind(tenant_id)
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(records)
}
