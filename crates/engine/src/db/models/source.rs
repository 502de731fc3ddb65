//! Source records scanned by event triggers.
//!
//! The engine reads tenant tables it does not own (bookings, incident
//! reports). Rows come back as id plus a JSON projection so trigger
//! filters can match any column without pinning the schema here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from a watched tenant table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Entity identifier.
    pub id: Uuid,

    /// Owning tenant.
    pub tenant_id: Uuid,

    /// When the entity was created.
    pub created_at: DateTime<Utc>,

    /// Full row as JSON, for filter evaluation and execution context.
    pub attributes: serde_json::Value,
}
