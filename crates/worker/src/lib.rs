//! BarkBase Workflow Worker
//!
//! Polling coordinator over the engine: claims due executions, resumes
//! elapsed waits, evaluates triggers, and processes scheduled jobs in
//! bounded batches until cancelled.

pub mod config;
pub mod worker;

pub use config::WorkerConfig;
pub use worker::Worker;
