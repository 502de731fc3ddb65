//! Notification dispatch.
//!
//! The engine does not deliver messages itself; notify steps hand a
//! [`NotificationRequest`] to an [`ActionDispatcher`]. The production
//! implementation is [`HttpDispatcher`]; tests substitute stubs.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineResult;

pub use http::HttpDispatcher;

/// A notify action to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Execution the step belongs to.
    pub execution_id: Uuid,

    /// Step issuing the notification.
    pub step_id: String,

    /// Delivery channel ("email", "sms", "push").
    pub channel: String,

    /// Message template name.
    pub template: String,

    /// Template parameters (usually the execution context).
    pub params: serde_json::Value,
}

impl NotificationRequest {
    /// Idempotency key for downstream dedupe.
    ///
    /// Stable across re-invocations of the same execution step, so a
    /// crash-recovery replay cannot double-send.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.execution_id, self.step_id)
    }
}

/// Performs the side effect of a notify step.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Deliver a notification, or fail with a reportable error.
    async fn send(&self, request: &NotificationRequest) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_stable() {
        let request = NotificationRequest {
            tenant_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            step_id: "remind".to_string(),
            channel: "email".to_string(),
            template: "booking_reminder".to_string(),
            params: serde_json::json!({}),
        };

        let key = request.idempotency_key();
        assert_eq!(key, request.idempotency_key());
        assert!(key.ends_with(":remind"));
        assert!(key.starts_with(&request.execution_id.to_string()));
    }

    #[test]
    fn test_request_serialization() {
        let request = NotificationRequest {
            tenant_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            step_id: "remind".to_string(),
            channel: "sms".to_string(),
            template: "checkin".to_string(),
            params: serde_json::json!({"pet": "Biscuit"}),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("checkin"));
        assert!(json.contains("Biscuit"));
    }
}
