//! Scheduled job processing.
//!
//! Converts "time has arrived" into "ready to resume": due resume jobs
//! re-arm waiting executions, due trigger jobs fire an interval window.
//! Jobs are deleted only after their work succeeds, so delivery is
//! at-least-once and the work itself must be (and is) self-checking.

use chrono::Duration;

use crate::db::models::{JobKind, ScheduledJob};
use crate::db::{queries, DbPool};
use crate::error::{EngineError, EngineResult};
use crate::workflow::TriggerSpec;

use super::trigger::TriggerEvaluator;

/// Counters from one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs taken from the due set.
    pub processed: usize,
    /// Executions resumed.
    pub resumed: usize,
    /// Interval windows fired.
    pub fired: usize,
    /// Jobs that failed and were left for the next poll.
    pub failed: usize,
}

/// Scheduler over due jobs.
pub struct Scheduler {
    db: DbPool,
    triggers: TriggerEvaluator,
    batch_size: i64,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(db: DbPool, triggers: TriggerEvaluator, batch_size: i64) -> Self {
        Self {
            db,
            triggers,
            batch_size,
        }
    }

    /// Process due jobs, oldest first, up to the batch limit.
    ///
    /// A failing job is logged and left in place for the next poll;
    /// one bad job cannot block the rest of the batch.
    pub async fn process_due_jobs(&self) -> EngineResult<SchedulerStats> {
        let mut stats = SchedulerStats::default();

        for job in queries::job::due_jobs(&self.db, self.batch_size).await? {
            stats.processed += 1;

            match self.process_job(&job).await {
                Ok(outcome) => {
                    match outcome {
                        JobOutcome::Resumed => stats.resumed += 1,
                        JobOutcome::Fired => stats.fired += 1,
                        JobOutcome::Stale => {}
                    }
                    if !queries::job::delete_job(&self.db, job.id).await? {
                        tracing::debug!(job_id = %job.id, "Job already deleted by another worker");
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(
                        job_id = %job.id,
                        kind = %job.kind,
                        error = %e,
                        "Scheduled job failed, leaving for next poll"
                    );
                }
            }
        }

        Ok(stats)
    }

    async fn process_job(&self, job: &ScheduledJob) -> EngineResult<JobOutcome> {
        let kind = match job.kind() {
            Ok(kind) => kind,
            Err(reason) => {
                // A job no code path can handle would otherwise come due
                // forever; drop it.
                tracing::warn!(job_id = %job.id, %reason, "Dropping unrecognized job");
                return Ok(JobOutcome::Stale);
            }
        };

        match kind {
            JobKind::ResumeExecution => self.resume_execution(job).await,
            JobKind::EvaluateTrigger => self.evaluate_trigger(job).await,
        }
    }

    /// Resume the waiting execution a job points at.
    async fn resume_execution(&self, job: &ScheduledJob) -> EngineResult<JobOutcome> {
        let execution_id = job.execution_id.ok_or_else(|| {
            EngineError::Validation(format!("Resume job {} has no execution id", job.id))
        })?;

        let resumed =
            queries::execution::resume_execution(&self.db, job.tenant_id, execution_id).await?;

        if resumed {
            tracing::debug!(
                execution_id = %execution_id,
                job_id = %job.id,
                "Execution resumed by scheduler"
            );
            Ok(JobOutcome::Resumed)
        } else {
            // Already resumed by the direct waiting-scan, cancelled, or
            // otherwise moved on; the job is stale.
            Ok(JobOutcome::Stale)
        }
    }

    /// Fire a due interval trigger and re-arm the next window.
    async fn evaluate_trigger(&self, job: &ScheduledJob) -> EngineResult<JobOutcome> {
        let definition_id = job.definition_id.ok_or_else(|| {
            EngineError::Validation(format!("Trigger job {} has no definition id", job.id))
        })?;

        let definition =
            queries::definition::get_definition(&self.db, job.tenant_id, definition_id).await?;

        let definition = match definition {
            Some(d) if d.active => d,
            _ => {
                tracing::debug!(
                    definition_id = %definition_id,
                    job_id = %job.id,
                    "Definition gone or inactive, dropping trigger job"
                );
                return Ok(JobOutcome::Stale);
            }
        };

        let every_seconds = match definition.trigger_spec()? {
            TriggerSpec::Interval { every_seconds } => every_seconds,
            TriggerSpec::Event { .. } => return Ok(JobOutcome::Stale),
        };

        self.triggers.fire_interval(&definition, job.run_at).await?;

        // Re-arm before deleting this job; the exclusion keeps the
        // NOT-EXISTS guard from seeing the job being consumed.
        queries::job::ensure_trigger_job(
            &self.db,
            job.tenant_id,
            definition.id,
            job.run_at + Duration::seconds(every_seconds),
            Some(job.id),
        )
        .await?;

        Ok(JobOutcome::Fired)
    }
}

enum JobOutcome {
    Resumed,
    Fired,
    /// The job's target moved on; consume the job without effect.
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_stats_default() {
        let stats = SchedulerStats::default();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.resumed, 0);
        assert_eq!(stats.fired, 0);
        assert_eq!(stats.failed, 0);
    }
}
