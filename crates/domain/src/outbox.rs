use chrono::{DateTime, Utc};
use gatewarden_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Delivery state of one outbox message.
///
/// Transitions: `Pending -> Processing -> {Processed | Failed}`;
/// `Failed -> Processing` while the retry budget remains;
/// `Failed -> DeadLettered` once the budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Staged, not yet claimed by a dispatcher.
    Pending,
    /// Claimed by a dispatcher; the claim expires after a staleness window.
    Processing,
    /// Successfully published; terminal.
    Processed,
    /// Publication failed; eligible again once the backoff delay passes.
    Failed,
    /// Retry budget exhausted; quarantined for operator triage; terminal.
    DeadLettered,
}

impl OutboxStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::DeadLettered => "dead_lettered",
        }
    }

    /// Parses a storage value into a status.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "dead_lettered" => Ok(Self::DeadLettered),
            _ => Err(AppError::Validation(format!(
                "unknown outbox status '{value}'"
            ))),
        }
    }

    /// Returns whether the status is terminal.
    ///
    /// Cleanup may only delete terminal messages.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::DeadLettered)
    }
}

/// A durably staged domain event awaiting at-least-once publication.
///
/// Created in the same transaction as the business mutation it describes;
/// mutated exclusively by the outbox dispatcher afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Stable message identifier, also used as the publication
    /// idempotency key.
    pub id: Uuid,
    /// Stable event type tag, e.g. `permission.checked`.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: Value,
    /// Current delivery state.
    pub status: OutboxStatus,
    /// Number of failed publication attempts so far.
    pub retry_count: u32,
    /// Staging timestamp.
    pub created_at: DateTime<Utc>,
    /// Publication timestamp, set on success.
    pub processed_at: Option<DateTime<Utc>>,
    /// Earliest next dispatch attempt for failed messages.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Last publication error, recorded on failure.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::OutboxStatus;

    #[test]
    fn status_round_trips_storage_value() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Processing,
            OutboxStatus::Processed,
            OutboxStatus::Failed,
            OutboxStatus::DeadLettered,
        ] {
            assert_eq!(OutboxStatus::parse(status.as_str()).ok(), Some(status));
        }
    }

    #[test]
    fn only_processed_and_dead_lettered_are_terminal() {
        assert!(OutboxStatus::Processed.is_terminal());
        assert!(OutboxStatus::DeadLettered.is_terminal());
        assert!(!OutboxStatus::Pending.is_terminal());
        assert!(!OutboxStatus::Processing.is_terminal());
        assert!(!OutboxStatus::Failed.is_terminal());
    }
}
