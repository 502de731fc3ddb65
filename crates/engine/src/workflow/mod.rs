//! Workflow spec types and condition evaluation.

pub mod condition;
pub mod spec;

pub use condition::{all_match, CompareOp, Condition};
pub use spec::{ActionSpec, BranchArm, SourceEntity, StepSpec, TriggerSpec, WorkflowSpec};
