//! Workflow definition model.
//!
//! Definitions are versioned-immutable: an edit inserts a new row with
//! a bumped version, and in-flight executions keep the row they pinned
//! at creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::workflow::{TriggerSpec, WorkflowSpec};

/// Database workflow definition record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Definition identifier.
    pub id: Uuid,

    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Human-readable workflow name.
    pub name: String,

    /// Definition version; bumped on edit, never mutated in place.
    pub version: i32,

    /// Whether the trigger evaluator considers this definition.
    pub active: bool,

    /// Trigger spec (JSON, deserializes to [`TriggerSpec`]).
    pub trigger: serde_json::Value,

    /// Step graph spec (JSON, deserializes to [`WorkflowSpec`]).
    pub spec: serde_json::Value,

    /// Event-trigger scan cursor; rows created after this instant are
    /// candidates on the next evaluation pass.
    pub last_checked_at: Option<DateTime<Utc>>,

    /// When the definition was created.
    pub created_at: DateTime<Utc>,

    /// When the definition was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Deserialize the trigger spec.
    pub fn trigger_spec(&self) -> EngineResult<TriggerSpec> {
        Ok(serde_json::from_value(self.trigger.clone())?)
    }

    /// Deserialize the step graph spec.
    pub fn workflow_spec(&self) -> EngineResult<WorkflowSpec> {
        Ok(serde_json::from_value(self.spec.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_definition(trigger: serde_json::Value, spec: serde_json::Value) -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "booking reminder".to_string(),
            version: 1,
            active: true,
            trigger,
            spec,
            last_checked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_trigger_spec_roundtrip() {
        let definition = make_definition(
            serde_json::json!({"kind": "event", "entity": "booking"}),
            serde_json::json!({"entry": "start", "steps": []}),
        );

        let trigger = definition.trigger_spec().unwrap();
        assert!(matches!(trigger, TriggerSpec::Event { .. }));
    }

    #[test]
    fn test_workflow_spec_invalid_json() {
        let definition = make_definition(
            serde_json::json!({"kind": "event", "entity": "booking"}),
            serde_json::json!({"steps": "not-a-list"}),
        );

        assert!(definition.workflow_spec().is_err());
    }
}
