//! Workflow definition spec types.
//!
//! A definition's `spec` column holds a [`WorkflowSpec`]: an entry step
//! id plus the step graph. Its `trigger` column holds a [`TriggerSpec`].
//! Both are stored as JSONB and deserialized on load.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::workflow::condition::Condition;

/// Tenant tables an event trigger may watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEntity {
    Booking,
    Incident,
}

impl SourceEntity {
    /// Table the entity kind is stored in.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Booking => "booking",
            Self::Incident => "incident",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.table()
    }
}

impl std::fmt::Display for SourceEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow start condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fires when a matching entity row is created.
    Event {
        entity: SourceEntity,
        /// Conditions the new row must satisfy; empty means any row.
        #[serde(default)]
        filter: Vec<Condition>,
    },
    /// Fires on a fixed period.
    Interval { every_seconds: i64 },
}

/// One arm of a branch step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchArm {
    /// Condition over the execution context.
    pub when: Condition,
    /// Step to transition to when the condition holds.
    pub next: String,
}

/// Step action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Send a message through the notification dispatcher.
    Notify {
        channel: String,
        template: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Park the execution for a fixed delay.
    Wait { seconds: i64 },
    /// Route on the execution context; first matching arm wins.
    Branch {
        arms: Vec<BranchArm>,
        /// Fallback step when no arm matches; absent means complete.
        #[serde(default)]
        default: Option<String>,
    },
    /// Complete the execution.
    Terminate,
}

/// One step in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSpec {
    /// Step identifier, unique within the definition.
    pub id: String,

    /// Action performed when the execution reaches this step.
    pub action: ActionSpec,

    /// Next step after the action completes; absent means the
    /// execution completes (branch steps route through their arms).
    #[serde(default)]
    pub next: Option<String>,
}

/// Complete step graph for a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSpec {
    /// Entry step id.
    pub entry: String,

    /// Step specs, in authoring order.
    pub steps: Vec<StepSpec>,
}

impl WorkflowSpec {
    /// Look up a step by id.
    pub fn get_step(&self, step_id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Validate the step graph: the entry step exists, step ids are
    /// unique, and every transition target resolves to a defined step.
    pub fn validate(&self) -> EngineResult<()> {
        if self.get_step(&self.entry).is_none() {
            return Err(EngineError::Validation(format!(
                "Entry step '{}' not found",
                self.entry
            )));
        }

        for (i, step) in self.steps.iter().enumerate() {
            if self.steps[..i].iter().any(|s| s.id == step.id) {
                return Err(EngineError::Validation(format!(
                    "Duplicate step id '{}'",
                    step.id
                )));
            }

            if let Some(next) = &step.next {
                self.require_step(next, &step.id)?;
            }

            if let ActionSpec::Branch { arms, default } = &step.action {
                for arm in arms {
                    self.require_step(&arm.next, &step.id)?;
                }
                if let Some(default) = default {
                    self.require_step(default, &step.id)?;
                }
            }
        }

        Ok(())
    }

    fn require_step(&self, target: &str, from: &str) -> EngineResult<()> {
        if self.get_step(target).is_none() {
            return Err(EngineError::Validation(format!(
                "Step '{}' references unknown step '{}'",
                from, target
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::condition::CompareOp;

    fn notify_step(id: &str, next: Option<&str>) -> StepSpec {
        StepSpec {
            id: id.to_string(),
            action: ActionSpec::Notify {
                channel: "email".to_string(),
                template: "booking_reminder".to_string(),
                params: serde_json::Value::Null,
            },
            next: next.map(|n| n.to_string()),
        }
    }

    #[test]
    fn test_get_step() {
        let spec = WorkflowSpec {
            entry: "start".to_string(),
            steps: vec![notify_step("start", None)],
        };

        assert!(spec.get_step("start").is_some());
        assert!(spec.get_step("missing").is_none());
    }

    #[test]
    fn test_validate_ok() {
        let spec = WorkflowSpec {
            entry: "start".to_string(),
            steps: vec![notify_step("start", Some("finish")), notify_step("finish", None)],
        };

        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_entry() {
        let spec = WorkflowSpec {
            entry: "start".to_string(),
            steps: vec![notify_step("other", None)],
        };

        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_dangling_next() {
        let spec = WorkflowSpec {
            entry: "start".to_string(),
            steps: vec![notify_step("start", Some("missing"))],
        };

        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_step_id() {
        let spec = WorkflowSpec {
            entry: "start".to_string(),
            steps: vec![notify_step("start", None), notify_step("start", None)],
        };

        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_branch_targets() {
        let spec = WorkflowSpec {
            entry: "route".to_string(),
            steps: vec![StepSpec {
                id: "route".to_string(),
                action: ActionSpec::Branch {
                    arms: vec![BranchArm {
                        when: Condition {
                            field: "booking.status".to_string(),
                            op: CompareOp::Eq,
                            value: serde_json::json!("confirmed"),
                        },
                        next: "missing".to_string(),
                    }],
                    default: None,
                },
                next: None,
            }],
        };

        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_action_spec_deserialization() {
        let json = serde_json::json!({
            "kind": "wait",
            "seconds": 86400
        });

        let action: ActionSpec = serde_json::from_value(json).unwrap();
        assert_eq!(action, ActionSpec::Wait { seconds: 86400 });
    }

    #[test]
    fn test_trigger_spec_deserialization() {
        let json = serde_json::json!({
            "kind": "event",
            "entity": "booking",
            "filter": [{"field": "status", "op": "eq", "value": "confirmed"}]
        });

        let trigger: TriggerSpec = serde_json::from_value(json).unwrap();
        match trigger {
            TriggerSpec::Event { entity, filter } => {
                assert_eq!(entity, SourceEntity::Booking);
                assert_eq!(filter.len(), 1);
            }
            _ => panic!("expected event trigger"),
        }
    }

    #[test]
    fn test_source_entity_table() {
        assert_eq!(SourceEntity::Booking.table(), "booking");
        assert_eq!(SourceEntity::Incident.table(), "incident");
    }
}
