//! Outbox dispatch, dead-letter quarantine, and retention cleanup.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use gatewarden_core::{AppError, AppResult};
use gatewarden_domain::OutboxMessage;
use tracing::{info, warn};
use uuid::Uuid;

use crate::authz_ports::{Clock, EventPublisher, OutboxRepository, OutboxStats};
use crate::retry::jittered_backoff;

/// Tuning for the outbox background tasks.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Maximum messages claimed per dispatch round.
    pub batch_size: usize,
    /// Retry budget before a message is dead-lettered.
    pub max_retries: u32,
    /// Staleness window after which a `Processing` claim is considered
    /// abandoned and becomes claimable again.
    pub claim_seconds: u32,
    /// Dispatcher poll interval.
    pub poll_interval_ms: u64,
    /// Delay before the first retry of a failed message.
    pub initial_retry_delay_seconds: u64,
    /// Upper bound on the retry delay.
    pub max_retry_delay_seconds: u64,
    /// Retention for `Processed` messages before cleanup deletes them.
    pub processed_retention_hours: i64,
    /// Longer retention for `DeadLettered` messages kept for triage.
    pub dead_letter_retention_hours: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 5,
            claim_seconds: 60,
            poll_interval_ms: 1_000,
            initial_retry_delay_seconds: 5,
            max_retry_delay_seconds: 900,
            processed_retention_hours: 24,
            dead_letter_retention_hours: 168,
        }
    }
}

impl OutboxConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> AppResult<()> {
        if self.batch_size == 0 {
            return Err(AppError::Validation(
                "outbox batch_size must be greater than zero".to_owned(),
            ));
        }
        if self.claim_seconds == 0 {
            return Err(AppError::Validation(
                "outbox claim_seconds must be greater than zero".to_owned(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "outbox poll_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.max_retry_delay_seconds < self.initial_retry_delay_seconds {
            return Err(AppError::Validation(
                "outbox max_retry_delay_seconds must not be below the initial delay".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Counters for one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Messages claimed this round.
    pub claimed: usize,
    /// Messages published and marked processed.
    pub published: usize,
    /// Messages whose publication attempt failed.
    pub failed: usize,
}

/// Drives the durable outbox: claims staged messages, publishes them
/// at-least-once, quarantines poison messages, and cleans up terminal
/// ones.
///
/// The dispatcher, dead-letter sweep, and cleanup sweep communicate only
/// through the persisted message table, so they can run in separate
/// processes unchanged.
#[derive(Clone)]
pub struct OutboxService {
    repository: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    config: OutboxConfig,
    dispatcher_id: String,
}

impl OutboxService {
    /// Creates an outbox service after validating the configuration.
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: OutboxConfig,
        dispatcher_id: impl Into<String>,
    ) -> AppResult<Self> {
        config.validate()?;

        Ok(Self {
            repository,
            publisher,
            clock,
            config,
            dispatcher_id: dispatcher_id.into(),
        })
    }

    /// Returns the configured poll interval for the dispatch loop.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Runs one dispatch round: claim a batch, publish each message, and
    /// finalize its state.
    ///
    /// Publication failures never lose a message and never escape this
    /// method; they only delay the message until its backoff passes or the
    /// retry budget runs out.
    pub async fn dispatch_once(&self) -> AppResult<DispatchOutcome> {
        let claims = self
            .repository
            .claim_batch(
                self.dispatcher_id.as_str(),
                self.config.batch_size,
                self.config.claim_seconds,
                self.config.max_retries,
            )
            .await?;

        let mut outcome = DispatchOutcome {
            claimed: claims.len(),
            ..DispatchOutcome::default()
        };

        for claim in claims {
            match self.publisher.publish(&claim.message).await {
                Ok(()) => {
                    if let Err(error) = self.repository.mark_processed(&claim).await {
                        // The claim may have gone stale and been handed to
                        // another dispatcher; at-least-once tolerates the
                        // duplicate.
                        warn!(
                            message_id = %claim.message.id,
                            error = %error,
                            "failed to finalize published message"
                        );
                    } else {
                        outcome.published += 1;
                    }
                }
                Err(error) => {
                    outcome.failed += 1;
                    let attempt = claim.message.retry_count.saturating_add(1);
                    let next_attempt_at = self.clock.now() + self.retry_delay(attempt);
                    warn!(
                        message_id = %claim.message.id,
                        event_type = claim.message.event_type.as_str(),
                        retry_count = attempt,
                        error = %error,
                        "outbox publication attempt failed"
                    );

                    if let Err(mark_error) = self
                        .repository
                        .mark_failed(&claim, error.to_string().as_str(), next_attempt_at)
                        .await
                    {
                        warn!(
                            message_id = %claim.message.id,
                            error = %mark_error,
                            "failed to record publication failure; claim will expire and retry"
                        );
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Quarantines failed messages whose retry budget is exhausted.
    pub async fn promote_dead_letters(&self) -> AppResult<u64> {
        let promoted = self
            .repository
            .promote_exhausted(self.config.max_retries)
            .await?;

        if promoted > 0 {
            warn!(promoted, "dead-lettered messages that exhausted their retry budget");
        }

        Ok(promoted)
    }

    /// Deletes terminal messages past their retention windows.
    pub async fn cleanup_once(&self) -> AppResult<u64> {
        let now = self.clock.now();
        let processed_before = now - chrono::Duration::hours(self.config.processed_retention_hours);
        let dead_lettered_before =
            now - chrono::Duration::hours(self.config.dead_letter_retention_hours);

        let deleted = self
            .repository
            .delete_terminal(processed_before, dead_lettered_before)
            .await?;

        if deleted > 0 {
            info!(deleted, "cleaned up terminal outbox messages");
        }

        Ok(deleted)
    }

    /// Returns a dead-lettered message to the dispatch queue with a fresh
    /// retry budget.
    pub async fn replay_dead_lettered(&self, id: Uuid) -> AppResult<()> {
        self.repository.replay(id).await?;
        info!(message_id = %id, "replayed dead-lettered message");
        Ok(())
    }

    /// Lists quarantined messages for operator inspection.
    pub async fn dead_letters(&self, limit: usize) -> AppResult<Vec<OutboxMessage>> {
        self.repository.list_dead_lettered(limit).await
    }

    /// Returns aggregate outbox counters.
    pub async fn stats(&self) -> AppResult<OutboxStats> {
        self.repository.stats().await
    }

    fn retry_delay(&self, attempt: u32) -> chrono::Duration {
        let delay = jittered_backoff(
            Duration::from_secs(self.config.initial_retry_delay_seconds),
            Duration::from_secs(self.config.max_retry_delay_seconds),
            attempt,
        );

        chrono::Duration::milliseconds(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX))
    }
}
