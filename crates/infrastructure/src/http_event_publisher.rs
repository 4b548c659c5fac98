use async_trait::async_trait;
use gatewarden_application::EventPublisher;
use gatewarden_core::{AppError, AppResult};
use gatewarden_domain::OutboxMessage;
use serde_json::json;

/// Webhook-based event publisher for the outbox dispatcher.
///
/// Delivery is at-least-once: the outbox message id travels as the
/// idempotency key so consumers can deduplicate redelivered messages.
pub struct HttpEventPublisher {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpEventPublisher {
    /// Creates a publisher posting to the given webhook endpoint.
    #[must_use]
    pub fn new(http_client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, message: &OutboxMessage) -> AppResult<()> {
        let response = self
            .http_client
            .post(self.endpoint.as_str())
            .header("Idempotency-Key", message.id.to_string())
            .json(&json!({
                "id": message.id,
                "event_type": message.event_type,
                "payload": message.payload,
                "created_at": message.created_at,
            }))
            .send()
            .await
            .map_err(|error| {
                AppError::PublishFailed(format!("event webhook transport error: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::PublishFailed(format!(
                "event webhook returned status {status}: {body}"
            )));
        }

        Ok(())
    }
}
