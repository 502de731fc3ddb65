//! Trigger evaluation.
//!
//! Watches tenant data for workflows whose start conditions are newly
//! satisfied and creates executions for them. Duplicate suppression is
//! the execution dedupe key (definition id + triggering entity id), so
//! overlapping scans and concurrent workers are harmless.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::db::models::{NewExecution, WorkflowDefinition};
use crate::db::{queries, DbPool};
use crate::error::EngineResult;
use crate::workflow::{all_match, TriggerSpec};

/// Counters from one trigger evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerStats {
    /// Definitions scanned.
    pub scanned: usize,
    /// Executions created.
    pub created: usize,
}

/// Trigger evaluator.
#[derive(Clone)]
pub struct TriggerEvaluator {
    db: DbPool,
    batch_size: i64,
}

impl TriggerEvaluator {
    /// Create a new trigger evaluator.
    pub fn new(db: DbPool, batch_size: i64) -> Self {
        Self { db, batch_size }
    }

    /// Evaluate all active triggers once.
    ///
    /// Event triggers scan their watched table past the definition's
    /// cursor; interval triggers are armed with an evaluation job the
    /// scheduler fires when due. Per-definition errors are logged and
    /// do not abort the pass.
    pub async fn process_triggers(&self) -> EngineResult<TriggerStats> {
        let mut stats = TriggerStats::default();

        for definition in queries::definition::list_event_definitions(&self.db).await? {
            stats.scanned += 1;
            match self.scan_event_definition(&definition).await {
                Ok(created) => stats.created += created,
                Err(e) => {
                    tracing::error!(
                        definition_id = %definition.id,
                        tenant_id = %definition.tenant_id,
                        error = %e,
                        "Event trigger scan failed"
                    );
                }
            }
        }

        for definition in queries::definition::list_interval_definitions(&self.db).await? {
            stats.scanned += 1;
            if let Err(e) = self.arm_interval_definition(&definition).await {
                tracing::error!(
                    definition_id = %definition.id,
                    tenant_id = %definition.tenant_id,
                    error = %e,
                    "Interval trigger arming failed"
                );
            }
        }

        Ok(stats)
    }

    /// Scan one event-triggered definition for newly created rows.
    async fn scan_event_definition(
        &self,
        definition: &WorkflowDefinition,
    ) -> EngineResult<usize> {
        let (entity, filter) = match definition.trigger_spec()? {
            TriggerSpec::Event { entity, filter } => (entity, filter),
            TriggerSpec::Interval { .. } => return Ok(0),
        };

        let spec = definition.workflow_spec()?;
        spec.validate()?;

        let records = queries::source::created_since(
            &self.db,
            entity,
            definition.tenant_id,
            definition.last_checked_at,
            self.batch_size,
        )
        .await?;

        let mut created = 0;
        let mut cursor: Option<DateTime<Utc>> = None;

        for record in &records {
            cursor = Some(cursor.map_or(record.created_at, |c| c.max(record.created_at)));

            if !all_match(&filter, &record.attributes) {
                continue;
            }

            let mut context = serde_json::Map::new();
            context.insert(entity.as_str().to_string(), record.attributes.clone());

            let new = NewExecution {
                tenant_id: definition.tenant_id,
                definition_id: definition.id,
                subject_kind: entity.as_str().to_string(),
                subject_id: record.id,
                dedupe_key: event_dedupe_key(definition.id, record.id),
                entry_step_id: spec.entry.clone(),
                context: serde_json::Value::Object(context),
            };

            if let Some(execution_id) = queries::execution::insert_execution(&self.db, &new).await?
            {
                created += 1;
                tracing::info!(
                    execution_id = %execution_id,
                    definition_id = %definition.id,
                    tenant_id = %definition.tenant_id,
                    subject_id = %record.id,
                    "Execution created from event trigger"
                );
            }
        }

        // Advance to the newest row seen, not to the scan time, so rows
        // committed mid-scan land in the next window.
        if let Some(cursor) = cursor {
            queries::definition::advance_scan_cursor(
                &self.db,
                definition.tenant_id,
                definition.id,
                cursor,
            )
            .await?;
        }

        Ok(created)
    }

    /// Keep one pending evaluation job armed for an interval trigger.
    async fn arm_interval_definition(&self, definition: &WorkflowDefinition) -> EngineResult<()> {
        let every_seconds = match definition.trigger_spec()? {
            TriggerSpec::Interval { every_seconds } => every_seconds,
            TriggerSpec::Event { .. } => return Ok(()),
        };

        let armed = queries::job::ensure_trigger_job(
            &self.db,
            definition.tenant_id,
            definition.id,
            Utc::now() + Duration::seconds(every_seconds),
            None,
        )
        .await?;

        if armed {
            tracing::debug!(
                definition_id = %definition.id,
                every_seconds,
                "Interval trigger armed"
            );
        }

        Ok(())
    }

    /// Fire one interval trigger window, creating its execution.
    ///
    /// Called by the scheduler when an evaluation job comes due. The
    /// window timestamp keys the dedupe, so redelivery of the same job
    /// cannot create a second execution.
    pub async fn fire_interval(
        &self,
        definition: &WorkflowDefinition,
        window: DateTime<Utc>,
    ) -> EngineResult<Option<Uuid>> {
        let spec = definition.workflow_spec()?;
        spec.validate()?;

        let new = NewExecution {
            tenant_id: definition.tenant_id,
            definition_id: definition.id,
            subject_kind: "schedule".to_string(),
            subject_id: definition.id,
            dedupe_key: window_dedupe_key(definition.id, window),
            entry_step_id: spec.entry.clone(),
            context: serde_json::json!({ "window": window }),
        };

        let execution_id = queries::execution::insert_execution(&self.db, &new).await?;

        if let Some(execution_id) = execution_id {
            tracing::info!(
                execution_id = %execution_id,
                definition_id = %definition.id,
                tenant_id = %definition.tenant_id,
                window = %window,
                "Execution created from interval trigger"
            );
        }

        Ok(execution_id)
    }
}

/// Dedupe key for an event trigger firing on one entity.
pub fn event_dedupe_key(definition_id: Uuid, entity_id: Uuid) -> String {
    format!("{}:{}", definition_id, entity_id)
}

/// Dedupe key for an interval trigger window.
pub fn window_dedupe_key(definition_id: Uuid, window: DateTime<Utc>) -> String {
    format!("{}:window:{}", definition_id, window.timestamp())
}
