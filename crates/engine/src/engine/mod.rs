//! Workflow engine core.
//!
//! Coordinates execution by:
//! - Advancing executions through their step graph (processor)
//! - Creating executions for newly satisfied triggers (trigger)
//! - Resuming parked work once its due time passes (scheduler)

pub mod processor;
pub mod scheduler;
pub mod trigger;

pub use processor::{StepDisposition, StepMessage, StepOutcome, StepProcessor};
pub use scheduler::{Scheduler, SchedulerStats};
pub use trigger::{TriggerEvaluator, TriggerStats};
