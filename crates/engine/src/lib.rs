//! BarkBase Workflow Engine
//!
//! This crate implements the tenant-scoped automation engine behind
//! BarkBase workflows, handling:
//!
//! - **Step Processing**: advance executions through their definition's
//!   step graph (notify, wait, branch, terminate)
//! - **Trigger Evaluation**: watch tenant data for newly satisfied start
//!   conditions and create executions
//! - **Scheduling**: resume parked executions and fire interval triggers
//!   once their due time passes
//! - **Dispatch**: deliver notification actions to the external
//!   notification service
//!
//! ## Architecture
//!
//! All workflow state lives in PostgreSQL. There is no message bus: a
//! worker claims work with atomic conditional updates, so the database
//! row itself is the lock and any number of workers can poll safely.
//! Definitions are versioned-immutable; an execution pins the definition
//! row it was created against.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`db`]: Database connectivity, row models, and queries
//! - [`dispatch`]: Notification dispatcher trait and HTTP client
//! - [`engine`]: Step processor, trigger evaluator, and scheduler
//! - [`error`]: Engine error taxonomy
//! - [`workflow`]: Workflow spec types and condition evaluation

pub mod config;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod workflow;

pub use error::{EngineError, EngineResult};
