//! HTTP notification dispatcher.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};

use super::{ActionDispatcher, NotificationRequest};

/// Dispatcher that POSTs notifications to the notification service.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDispatcher {
    /// Create a new dispatcher.
    ///
    /// The request timeout bounds how long a hung notification send can
    /// hold up a worker batch item.
    pub fn new(base_url: &str, timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn notify_url(&self) -> String {
        format!("{}/api/notifications", self.base_url)
    }
}

#[async_trait]
impl ActionDispatcher for HttpDispatcher {
    async fn send(&self, request: &NotificationRequest) -> EngineResult<()> {
        let response = self
            .client
            .post(self.notify_url())
            .header("Idempotency-Key", request.idempotency_key())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Action(format!(
                "Notification service returned {}: {}",
                status, body
            )));
        }

        tracing::debug!(
            execution_id = %request.execution_id,
            step_id = %request.step_id,
            channel = %request.channel,
            "Notification dispatched"
        );

        Ok(())
    }
}
