//! Step processing: the execution state machine.
//!
//! Given an execution and its current step, performs the step's action,
//! computes the next step, and applies the transition as a conditional
//! update. A transition that matches zero rows means another worker or
//! an external cancel got there first; the message is dropped.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{ExecutionStatus, JobKind, NewJob, WorkflowExecution};
use crate::db::{queries, DbPool};
use crate::dispatch::{ActionDispatcher, NotificationRequest};
use crate::error::{EngineError, EngineResult};
use crate::workflow::{ActionSpec, StepSpec};

/// Work item identifying one step of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMessage {
    pub execution_id: Uuid,
    pub definition_id: Uuid,
    pub tenant_id: Uuid,
    pub step_id: String,
}

impl StepMessage {
    /// Build the message for an execution's current step.
    pub fn for_execution(execution: &WorkflowExecution) -> Option<Self> {
        execution.current_step_id.as_ref().map(|step_id| Self {
            execution_id: execution.id,
            definition_id: execution.definition_id,
            tenant_id: execution.tenant_id,
            step_id: step_id.clone(),
        })
    }
}

/// What a step's action decided.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Advance to another step immediately.
    Continue { next: String },
    /// Park the execution for a delay, then reprocess this step.
    Wait { seconds: i64 },
    /// The workflow is finished.
    Done,
}

/// How processing left the execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StepDisposition {
    /// Advanced to the named step; it runs on a later poll.
    Advanced { next: String },
    /// Parked until the resume time.
    Waiting { resume_at: DateTime<Utc> },
    /// Reached a terminal step.
    Completed,
    /// Action failed; will retry on a later poll.
    Retrying { attempts: i32 },
    /// Action failed terminally; execution marked failed.
    Failed,
    /// Dropped without side effects (stale message, concurrent
    /// transition, cancelled execution).
    Skipped { reason: &'static str },
}

/// Step processor.
pub struct StepProcessor {
    db: DbPool,
    dispatcher: Arc<dyn ActionDispatcher>,
    max_attempts: i32,
}

impl StepProcessor {
    /// Create a new step processor.
    pub fn new(db: DbPool, dispatcher: Arc<dyn ActionDispatcher>, max_attempts: i32) -> Self {
        Self {
            db,
            dispatcher,
            max_attempts,
        }
    }

    /// Process one step of one execution.
    ///
    /// Returns `EngineError::NotFound` when the execution, its
    /// definition, or the step spec is gone; callers log and skip.
    pub async fn process_step(&self, msg: &StepMessage) -> EngineResult<StepDisposition> {
        let execution = queries::execution::get_execution(&self.db, msg.tenant_id, msg.execution_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Execution not found: {}", msg.execution_id))
            })?;

        if execution.is_terminal() {
            return Ok(StepDisposition::Skipped {
                reason: "execution is terminal",
            });
        }

        if execution.status() == ExecutionStatus::Waiting {
            return Ok(StepDisposition::Skipped {
                reason: "execution is waiting",
            });
        }

        match &execution.current_step_id {
            Some(current) if current == &msg.step_id => {}
            _ => {
                return Ok(StepDisposition::Skipped {
                    reason: "stale step message",
                })
            }
        }

        let definition =
            queries::definition::get_definition(&self.db, msg.tenant_id, msg.definition_id)
                .await?
                .ok_or_else(|| {
                    EngineError::NotFound(format!("Definition not found: {}", msg.definition_id))
                })?;

        let spec = definition.workflow_spec()?;
        let step = spec.get_step(&msg.step_id).ok_or_else(|| {
            EngineError::NotFound(format!(
                "Step '{}' not found in definition {}",
                msg.step_id, msg.definition_id
            ))
        })?;

        // First processing enters the entry step.
        if execution.status() == ExecutionStatus::Pending
            && !queries::execution::mark_running(&self.db, msg.tenant_id, msg.execution_id).await?
        {
            return Ok(StepDisposition::Skipped {
                reason: "no longer pending",
            });
        }

        match execute_action(self.dispatcher.as_ref(), &execution, step).await {
            Ok(outcome) => self.apply_outcome(&execution, step, outcome).await,
            Err(EngineError::Action(reason)) => {
                self.handle_action_failure(&execution, &reason).await
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a step outcome as a conditional update.
    async fn apply_outcome(
        &self,
        execution: &WorkflowExecution,
        step: &StepSpec,
        outcome: StepOutcome,
    ) -> EngineResult<StepDisposition> {
        let mut context = execution.context.clone();

        match outcome {
            StepOutcome::Continue { next } => {
                record_step_result(&mut context, &step.id, serde_json::json!({"next": next}));

                let advanced = queries::execution::advance_step(
                    &self.db,
                    execution.tenant_id,
                    execution.id,
                    &step.id,
                    &next,
                    &context,
                )
                .await?;

                if !advanced {
                    return Ok(StepDisposition::Skipped {
                        reason: "concurrent transition",
                    });
                }

                tracing::debug!(
                    execution_id = %execution.id,
                    from = %step.id,
                    to = %next,
                    "Execution advanced"
                );

                Ok(StepDisposition::Advanced { next })
            }
            StepOutcome::Wait { seconds } => {
                let resume_at = Utc::now() + Duration::seconds(seconds);
                mark_step_waited(&mut context, &step.id);

                let parked = queries::execution::mark_waiting(
                    &self.db,
                    execution.tenant_id,
                    execution.id,
                    &step.id,
                    resume_at,
                    &context,
                )
                .await?;

                if !parked {
                    return Ok(StepDisposition::Skipped {
                        reason: "concurrent transition",
                    });
                }

                // The direct waiting-scan resumes this execution even if
                // the job insert below fails; the job keeps resume latency
                // tied to the scheduler rather than the scan batch.
                queries::job::insert_job(
                    &self.db,
                    &NewJob {
                        tenant_id: execution.tenant_id,
                        kind: JobKind::ResumeExecution,
                        execution_id: Some(execution.id),
                        definition_id: None,
                        run_at: resume_at,
                    },
                )
                .await?;

                tracing::debug!(
                    execution_id = %execution.id,
                    step_id = %step.id,
                    resume_at = %resume_at,
                    "Execution parked"
                );

                Ok(StepDisposition::Waiting { resume_at })
            }
            StepOutcome::Done => {
                record_step_result(&mut context, &step.id, serde_json::json!({"done": true}));

                let completed = queries::execution::mark_completed(
                    &self.db,
                    execution.tenant_id,
                    execution.id,
                    &context,
                )
                .await?;

                if !completed {
                    return Ok(StepDisposition::Skipped {
                        reason: "concurrent transition",
                    });
                }

                tracing::info!(
                    execution_id = %execution.id,
                    last_step = %step.id,
                    "Execution completed"
                );

                Ok(StepDisposition::Completed)
            }
        }
    }

    /// Record a failed action attempt, failing the execution once the
    /// retry budget is exhausted.
    async fn handle_action_failure(
        &self,
        execution: &WorkflowExecution,
        reason: &str,
    ) -> EngineResult<StepDisposition> {
        let attempts = execution.attempts + 1;

        if attempts >= self.max_attempts {
            let mut context = execution.context.clone();
            if let serde_json::Value::Object(map) = &mut context {
                map.insert(
                    "last_error".to_string(),
                    serde_json::Value::String(reason.to_string()),
                );
            }

            queries::execution::mark_failed(
                &self.db,
                execution.tenant_id,
                execution.id,
                reason,
                &context,
            )
            .await?;

            tracing::warn!(
                execution_id = %execution.id,
                attempts,
                error = %reason,
                "Execution failed after exhausting retries"
            );

            return Ok(StepDisposition::Failed);
        }

        queries::execution::record_attempt(
            &self.db,
            execution.tenant_id,
            execution.id,
            attempts,
            reason,
        )
        .await?;

        tracing::warn!(
            execution_id = %execution.id,
            attempts,
            max_attempts = self.max_attempts,
            error = %reason,
            "Step action failed, will retry"
        );

        Ok(StepDisposition::Retrying { attempts })
    }
}

/// Execute a step's action and decide the outcome.
///
/// Pure with respect to the database: the only side effect is the
/// dispatcher call for notify steps.
pub async fn execute_action(
    dispatcher: &dyn ActionDispatcher,
    execution: &WorkflowExecution,
    step: &StepSpec,
) -> EngineResult<StepOutcome> {
    match &step.action {
        ActionSpec::Notify {
            channel,
            template,
            params,
        } => {
            let request = NotificationRequest {
                tenant_id: execution.tenant_id,
                execution_id: execution.id,
                step_id: step.id.clone(),
                channel: channel.clone(),
                template: template.clone(),
                params: serde_json::json!({
                    "params": params,
                    "context": execution.context,
                }),
            };

            dispatcher.send(&request).await?;
            Ok(next_or_done(step))
        }
        ActionSpec::Wait { seconds } => {
            // A resumed execution reprocesses its wait step; the context
            // marker distinguishes that visit from the first one.
            if *seconds <= 0 || step_waited(&execution.context, &step.id) {
                Ok(next_or_done(step))
            } else {
                Ok(StepOutcome::Wait { seconds: *seconds })
            }
        }
        ActionSpec::Branch { arms, default } => {
            for arm in arms {
                if arm.when.matches(&execution.context) {
                    return Ok(StepOutcome::Continue {
                        next: arm.next.clone(),
                    });
                }
            }
            match default {
                Some(next) => Ok(StepOutcome::Continue { next: next.clone() }),
                None => Ok(StepOutcome::Done),
            }
        }
        ActionSpec::Terminate => Ok(StepOutcome::Done),
    }
}

fn next_or_done(step: &StepSpec) -> StepOutcome {
    match &step.next {
        Some(next) => StepOutcome::Continue { next: next.clone() },
        None => StepOutcome::Done,
    }
}

/// Record a step result under `steps.<step_id>` in the context.
fn record_step_result(context: &mut serde_json::Value, step_id: &str, result: serde_json::Value) {
    if !context.is_object() {
        *context = serde_json::json!({});
    }
    if let serde_json::Value::Object(map) = context {
        let steps = map
            .entry("steps".to_string())
            .or_insert_with(|| serde_json::json!({}));
        if let serde_json::Value::Object(steps) = steps {
            steps.insert(step_id.to_string(), result);
        }
    }
}

/// Mark a wait step as having parked once.
fn mark_step_waited(context: &mut serde_json::Value, step_id: &str) {
    record_step_result(context, step_id, serde_json::json!({"waited": true}));
}

/// Whether a wait step already parked this execution.
fn step_waited(context: &serde_json::Value, step_id: &str) -> bool {
    context
        .get("steps")
        .and_then(|steps| steps.get(step_id))
        .and_then(|step| step.get("waited"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{BranchArm, CompareOp, Condition};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Dispatcher stub that records every request.
    #[derive(Default)]
    struct StubDispatcher {
        requests: Mutex<Vec<NotificationRequest>>,
        fail: bool,
    }

    impl StubDispatcher {
        fn failing() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ActionDispatcher for StubDispatcher {
        async fn send(&self, request: &NotificationRequest) -> EngineResult<()> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(EngineError::Action("stub failure".to_string()));
            }
            Ok(())
        }
    }

    fn make_execution(context: serde_json::Value) -> WorkflowExecution {
        WorkflowExecution {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            definition_id: Uuid::new_v4(),
            subject_kind: "booking".to_string(),
            subject_id: Uuid::new_v4(),
            dedupe_key: "test".to_string(),
            status: "running".to_string(),
            current_step_id: Some("start".to_string()),
            context,
            error: None,
            attempts: 0,
            scheduled_at: None,
            last_processed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn notify_step(id: &str, next: Option<&str>) -> StepSpec {
        StepSpec {
            id: id.to_string(),
            action: ActionSpec::Notify {
                channel: "email".to_string(),
                template: "booking_reminder".to_string(),
                params: serde_json::json!({"greeting": "hello"}),
            },
            next: next.map(|n| n.to_string()),
        }
    }

    #[tokio::test]
    async fn test_notify_dispatches_once_and_continues() {
        let dispatcher = StubDispatcher::default();
        let execution = make_execution(serde_json::json!({}));
        let step = notify_step("start", Some("finish"));

        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();

        assert_eq!(
            outcome,
            StepOutcome::Continue {
                next: "finish".to_string()
            }
        );
        assert_eq!(dispatcher.call_count(), 1);

        let requests = dispatcher.requests.lock().unwrap();
        assert_eq!(requests[0].step_id, "start");
        assert_eq!(
            requests[0].idempotency_key(),
            format!("{}:start", execution.id)
        );
    }

    #[tokio::test]
    async fn test_notify_without_next_completes() {
        let dispatcher = StubDispatcher::default();
        let execution = make_execution(serde_json::json!({}));
        let step = notify_step("start", None);

        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();
        assert_eq!(outcome, StepOutcome::Done);
    }

    #[tokio::test]
    async fn test_notify_failure_surfaces_action_error() {
        let dispatcher = StubDispatcher::failing();
        let execution = make_execution(serde_json::json!({}));
        let step = notify_step("start", Some("finish"));

        let err = execute_action(&dispatcher, &execution, &step)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Action(_)));
        assert_eq!(dispatcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_zero_continues_without_parking() {
        let dispatcher = StubDispatcher::default();
        let execution = make_execution(serde_json::json!({}));
        let step = StepSpec {
            id: "start".to_string(),
            action: ActionSpec::Wait { seconds: 0 },
            next: Some("finish".to_string()),
        };

        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();

        assert_eq!(
            outcome,
            StepOutcome::Continue {
                next: "finish".to_string()
            }
        );
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_parks_then_continues_after_resume() {
        let dispatcher = StubDispatcher::default();
        let step = StepSpec {
            id: "pause".to_string(),
            action: ActionSpec::Wait { seconds: 60 },
            next: Some("finish".to_string()),
        };

        let mut execution = make_execution(serde_json::json!({}));
        execution.current_step_id = Some("pause".to_string());

        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();
        assert_eq!(outcome, StepOutcome::Wait { seconds: 60 });

        // After parking, the context carries the waited marker; the
        // resumed visit advances instead of parking again.
        mark_step_waited(&mut execution.context, "pause");
        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Continue {
                next: "finish".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_branch_picks_first_matching_arm() {
        let dispatcher = StubDispatcher::default();
        let execution = make_execution(serde_json::json!({
            "booking": {"status": "confirmed"}
        }));

        let step = StepSpec {
            id: "route".to_string(),
            action: ActionSpec::Branch {
                arms: vec![
                    BranchArm {
                        when: Condition {
                            field: "booking.status".to_string(),
                            op: CompareOp::Eq,
                            value: serde_json::json!("cancelled"),
                        },
                        next: "apologize".to_string(),
                    },
                    BranchArm {
                        when: Condition {
                            field: "booking.status".to_string(),
                            op: CompareOp::Eq,
                            value: serde_json::json!("confirmed"),
                        },
                        next: "remind".to_string(),
                    },
                ],
                default: None,
            },
            next: None,
        };

        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Continue {
                next: "remind".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_branch_falls_back_to_default() {
        let dispatcher = StubDispatcher::default();
        let execution = make_execution(serde_json::json!({}));

        let step = StepSpec {
            id: "route".to_string(),
            action: ActionSpec::Branch {
                arms: vec![BranchArm {
                    when: Condition {
                        field: "booking.status".to_string(),
                        op: CompareOp::Eq,
                        value: serde_json::json!("confirmed"),
                    },
                    next: "remind".to_string(),
                }],
                default: Some("finish".to_string()),
            },
            next: None,
        };

        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Continue {
                next: "finish".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_branch_without_match_or_default_completes() {
        let dispatcher = StubDispatcher::default();
        let execution = make_execution(serde_json::json!({}));

        let step = StepSpec {
            id: "route".to_string(),
            action: ActionSpec::Branch {
                arms: vec![],
                default: None,
            },
            next: None,
        };

        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();
        assert_eq!(outcome, StepOutcome::Done);
    }

    #[tokio::test]
    async fn test_terminate_completes() {
        let dispatcher = StubDispatcher::default();
        let execution = make_execution(serde_json::json!({}));
        let step = StepSpec {
            id: "finish".to_string(),
            action: ActionSpec::Terminate,
            next: None,
        };

        let outcome = execute_action(&dispatcher, &execution, &step).await.unwrap();
        assert_eq!(outcome, StepOutcome::Done);
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[test]
    fn test_record_step_result() {
        let mut context = serde_json::json!({});
        record_step_result(&mut context, "start", serde_json::json!({"next": "finish"}));

        assert_eq!(
            context["steps"]["start"]["next"],
            serde_json::json!("finish")
        );
    }

    #[test]
    fn test_step_waited_marker() {
        let mut context = serde_json::json!({"booking": {"status": "confirmed"}});
        assert!(!step_waited(&context, "pause"));

        mark_step_waited(&mut context, "pause");
        assert!(step_waited(&context, "pause"));
        // Other keys survive.
        assert_eq!(context["booking"]["status"], serde_json::json!("confirmed"));
    }

    /// Walk the wait-then-notify shape end to end at the action level:
    /// wait 0 resolves immediately, notify fires exactly once, and the
    /// terminal step completes the run.
    #[tokio::test]
    async fn test_wait_notify_terminate_walk() {
        let dispatcher = StubDispatcher::default();
        let steps = vec![
            StepSpec {
                id: "start".to_string(),
                action: ActionSpec::Wait { seconds: 0 },
                next: Some("remind".to_string()),
            },
            notify_step("remind", Some("finish")),
            StepSpec {
                id: "finish".to_string(),
                action: ActionSpec::Terminate,
                next: None,
            },
        ];

        let mut execution = make_execution(serde_json::json!({}));
        let mut current = "start".to_string();

        loop {
            execution.current_step_id = Some(current.clone());
            let step = steps.iter().find(|s| s.id == current).unwrap();
            match execute_action(&dispatcher, &execution, step).await.unwrap() {
                StepOutcome::Continue { next } => current = next,
                StepOutcome::Wait { .. } => panic!("wait 0 must not park"),
                StepOutcome::Done => break,
            }
        }

        assert_eq!(current, "finish");
        assert_eq!(dispatcher.call_count(), 1);
    }

    #[test]
    fn test_step_message_for_execution() {
        let execution = make_execution(serde_json::json!({}));
        let msg = StepMessage::for_execution(&execution).unwrap();
        assert_eq!(msg.execution_id, execution.id);
        assert_eq!(msg.step_id, "start");

        let mut terminal = execution;
        terminal.current_step_id = None;
        assert!(StepMessage::for_execution(&terminal).is_none());
    }
}
