//! Workflow execution model.
//!
//! One row per live instance of a definition running against a
//! triggering entity. The row doubles as the concurrency lock: claims
//! and state transitions are atomic conditional updates against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// High-level execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created by a trigger, not yet entered its entry step.
    Pending,
    /// Actively advancing through steps.
    Running,
    /// Parked on a wait step until `scheduled_at`.
    Waiting,
    /// Reached a terminate step.
    Completed,
    /// A step action exhausted its retry budget.
    Failed,
    /// Cancelled externally.
    Cancelled,
}

impl ExecutionStatus {
    /// Stable string form stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the execution can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for ExecutionStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "waiting" => Self::Waiting,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

/// Database workflow execution record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Execution identifier.
    pub id: Uuid,

    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Pinned definition row this execution runs against.
    pub definition_id: Uuid,

    /// Kind of the triggering entity ("booking", "incident", "schedule").
    pub subject_kind: String,

    /// Identifier of the triggering entity.
    pub subject_id: Uuid,

    /// Unique trigger idempotency key (definition id + entity id).
    pub dedupe_key: String,

    /// Execution status (string form of [`ExecutionStatus`]).
    pub status: String,

    /// Current step id; null only in terminal states.
    pub current_step_id: Option<String>,

    /// Accumulated variables and step results.
    pub context: serde_json::Value,

    /// Error reason once the execution has failed.
    pub error: Option<String>,

    /// Action attempts for the current step.
    pub attempts: i32,

    /// Resume time; set only while status is `waiting`.
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Claim marker bounding how often workers re-attempt this row.
    pub last_processed_at: Option<DateTime<Utc>>,

    /// When the execution was created.
    pub created_at: DateTime<Utc>,

    /// When the execution was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    /// Parsed execution status.
    pub fn status(&self) -> ExecutionStatus {
        ExecutionStatus::from(self.status.as_str())
    }

    /// Whether the execution can make no further progress.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Request to create a new execution from a fired trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExecution {
    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Definition the execution pins.
    pub definition_id: Uuid,

    /// Kind of the triggering entity.
    pub subject_kind: String,

    /// Identifier of the triggering entity.
    pub subject_id: Uuid,

    /// Trigger idempotency key.
    pub dedupe_key: String,

    /// Entry step of the pinned definition.
    pub entry_step_id: String,

    /// Initial context (trigger payload).
    pub context: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ExecutionStatus::Pending.to_string(), "pending");
        assert_eq!(ExecutionStatus::Waiting.to_string(), "waiting");
        assert_eq!(ExecutionStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(ExecutionStatus::from("running"), ExecutionStatus::Running);
        assert_eq!(ExecutionStatus::from("WAITING"), ExecutionStatus::Waiting);
        assert_eq!(ExecutionStatus::from("canceled"), ExecutionStatus::Cancelled);
        assert_eq!(ExecutionStatus::from("unknown"), ExecutionStatus::Pending);
    }

    #[test]
    fn test_status_terminal() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Waiting.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_execution_status_parse() {
        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            definition_id: Uuid::new_v4(),
            subject_kind: "booking".to_string(),
            subject_id: Uuid::new_v4(),
            dedupe_key: "def:booking".to_string(),
            status: "waiting".to_string(),
            current_step_id: Some("remind".to_string()),
            context: serde_json::json!({}),
            error: None,
            attempts: 0,
            scheduled_at: Some(Utc::now()),
            last_processed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(execution.status(), ExecutionStatus::Waiting);
        assert!(!execution.is_terminal());
    }
}
