use async_trait::async_trait;
use gatewarden_core::AppResult;
use gatewarden_domain::OutboxMessage;

/// Message-bus publication port used by the outbox dispatcher.
///
/// Delivery is at-least-once with no ordering guarantee; failures surface
/// as [`gatewarden_core::AppError::PublishFailed`] and are retried by the
/// dispatcher, never by the business operation that staged the message.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one staged message to downstream consumers.
    async fn publish(&self, message: &OutboxMessage) -> AppResult<()>;
}
