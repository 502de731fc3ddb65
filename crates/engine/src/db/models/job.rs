//! Scheduled job model.
//!
//! Jobs defer work to a future instant: resuming a waiting execution,
//! or re-running a scheduled trigger evaluation. The scheduler consumes
//! and deletes them once due; they are never mutated otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Scheduled job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Resume a waiting execution once its wait elapses.
    ResumeExecution,
    /// Fire an interval trigger window.
    EvaluateTrigger,
}

impl JobKind {
    /// Stable string form stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResumeExecution => "resume_execution",
            Self::EvaluateTrigger => "evaluate_trigger",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resume_execution" => Ok(Self::ResumeExecution),
            "evaluate_trigger" => Ok(Self::EvaluateTrigger),
            _ => Err(format!("Unknown job kind: {}", s)),
        }
    }
}

/// Database scheduled job record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Job identifier.
    pub id: Uuid,

    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Job kind (string form of [`JobKind`]).
    pub kind: String,

    /// Execution to resume (resume jobs).
    pub execution_id: Option<Uuid>,

    /// Definition to evaluate (trigger jobs).
    pub definition_id: Option<Uuid>,

    /// Due time.
    pub run_at: DateTime<Utc>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Parsed job kind.
    pub fn kind(&self) -> Result<JobKind, String> {
        self.kind.parse()
    }
}

/// Request to create a new scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Job kind.
    pub kind: JobKind,

    /// Execution to resume (resume jobs).
    pub execution_id: Option<Uuid>,

    /// Definition to evaluate (trigger jobs).
    pub definition_id: Option<Uuid>,

    /// Due time.
    pub run_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_display() {
        assert_eq!(JobKind::ResumeExecution.to_string(), "resume_execution");
        assert_eq!(JobKind::EvaluateTrigger.to_string(), "evaluate_trigger");
    }

    #[test]
    fn test_job_kind_from_str() {
        assert_eq!(
            "resume_execution".parse::<JobKind>().unwrap(),
            JobKind::ResumeExecution
        );
        assert_eq!(
            "evaluate_trigger".parse::<JobKind>().unwrap(),
            JobKind::EvaluateTrigger
        );
        assert!("sweep".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_job_kind_parse_from_row() {
        let job = ScheduledJob {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            kind: "resume_execution".to_string(),
            execution_id: Some(Uuid::new_v4()),
            definition_id: None,
            run_at: Utc::now(),
            created_at: Utc::now(),
        };

        assert_eq!(job.kind().unwrap(), JobKind::ResumeExecution);
    }
}
