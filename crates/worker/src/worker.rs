//! Worker lifecycle and polling loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use barkbase_engine::db::models::WorkflowExecution;
use barkbase_engine::db::{queries, DbPool};
use barkbase_engine::dispatch::HttpDispatcher;
use barkbase_engine::engine::{Scheduler, StepDisposition, StepMessage, StepProcessor, TriggerEvaluator};
use barkbase_engine::EngineResult;

use crate::config::WorkerConfig;

/// Polling worker that drives the workflow engine.
pub struct Worker {
    /// Worker configuration.
    config: WorkerConfig,

    /// Database pool shared with the engine components.
    db: DbPool,

    /// Step processor.
    processor: StepProcessor,

    /// Trigger evaluator.
    triggers: TriggerEvaluator,

    /// Scheduled job processor.
    scheduler: Scheduler,
}

impl Worker {
    /// Create a new worker.
    pub fn new(config: WorkerConfig, db: DbPool) -> EngineResult<Self> {
        let dispatcher = Arc::new(HttpDispatcher::new(
            &config.engine.notify_url,
            Duration::from_secs(config.engine.notify_timeout_secs),
        )?);

        let processor = StepProcessor::new(
            db.clone(),
            dispatcher,
            config.engine.max_step_attempts,
        );
        let triggers = TriggerEvaluator::new(db.clone(), config.engine.batch_size);
        let scheduler = Scheduler::new(db.clone(), triggers.clone(), config.engine.batch_size);

        Ok(Self {
            config,
            db,
            processor,
            triggers,
            scheduler,
        })
    }

    /// Run the polling loop until the token is cancelled.
    ///
    /// Cancellation is observed only between iterations, so an
    /// in-flight batch always finishes before shutdown.
    pub async fn run(&self, token: CancellationToken) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            poll_interval_secs = self.config.engine.poll_interval_secs,
            batch_size = self.config.engine.batch_size,
            "Worker started"
        );

        let poll_interval = Duration::from_secs(self.config.engine.poll_interval_secs);

        while !token.is_cancelled() {
            self.run_once().await;

            // Fixed interval regardless of work found; backpressure is
            // the batch limit, not an adaptive sleep.
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "Worker stopped");
    }

    /// One polling iteration. Every phase catches its own errors; no
    /// failure here stops the loop.
    pub async fn run_once(&self) {
        // Phase 1: claim and process due pending/running executions.
        match queries::execution::claim_batch(
            &self.db,
            self.config.engine.claim_stale_secs,
            self.config.engine.batch_size,
        )
        .await
        {
            Ok(batch) => {
                for execution in &batch {
                    self.process_execution(execution).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to claim execution batch"),
        }

        // Phase 2: resume waits that have elapsed; the resume claims
        // the row, so process it in the same pass.
        match queries::execution::resume_due(&self.db, self.config.engine.batch_size).await {
            Ok(resumed) => {
                for execution in &resumed {
                    tracing::debug!(execution_id = %execution.id, "Wait elapsed, resuming");
                    self.process_execution(execution).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to resume waiting executions"),
        }

        // Phase 3: evaluate triggers.
        match self.triggers.process_triggers().await {
            Ok(stats) if stats.created > 0 => {
                tracing::info!(
                    scanned = stats.scanned,
                    created = stats.created,
                    "Trigger evaluation created executions"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Trigger evaluation failed"),
        }

        // Phase 4: process due scheduled jobs.
        match self.scheduler.process_due_jobs().await {
            Ok(stats) if stats.processed > 0 => {
                tracing::debug!(
                    processed = stats.processed,
                    resumed = stats.resumed,
                    fired = stats.fired,
                    failed = stats.failed,
                    "Scheduler pass finished"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Scheduler pass failed"),
        }
    }

    /// Process one claimed execution, isolating its errors.
    async fn process_execution(&self, execution: &WorkflowExecution) {
        let Some(msg) = StepMessage::for_execution(execution) else {
            tracing::warn!(
                execution_id = %execution.id,
                status = %execution.status,
                "Claimed execution has no current step, skipping"
            );
            return;
        };

        match self.processor.process_step(&msg).await {
            Ok(StepDisposition::Skipped { reason }) => {
                tracing::debug!(execution_id = %execution.id, reason, "Step skipped");
            }
            Ok(disposition) => {
                tracing::debug!(
                    execution_id = %execution.id,
                    step_id = %msg.step_id,
                    ?disposition,
                    "Step processed"
                );
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    execution_id = %execution.id,
                    step_id = %msg.step_id,
                    error = %e,
                    "Execution or step gone, skipping"
                );
            }
            Err(e) => {
                tracing::error!(
                    execution_id = %execution.id,
                    step_id = %msg.step_id,
                    error = %e,
                    "Step processing failed"
                );
            }
        }
    }
}
