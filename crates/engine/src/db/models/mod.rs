//! Row models for workflow tables.

pub mod definition;
pub mod execution;
pub mod job;
pub mod source;

pub use definition::WorkflowDefinition;
pub use execution::{ExecutionStatus, NewExecution, WorkflowExecution};
pub use job::{JobKind, NewJob, ScheduledJob};
pub use source::SourceRecord;
