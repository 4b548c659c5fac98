use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use gatewarden_core::{AppError, AppResult, TenantId};
use gatewarden_domain::{DomainEvent, OutboxMessage, OutboxStatus};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::authz_ports::{
    ClaimedOutboxMessage, Clock, EventPublisher, OutboxRepository, OutboxStats,
};

use super::{OutboxConfig, OutboxService};

struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: std::sync::Mutex::new(now),
        })
    }

    fn advance(&self, delta: Duration) {
        match self.now.lock() {
            Ok(mut guard) => *guard = *guard + delta,
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                *guard = *guard + delta;
            }
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

struct StoredRow {
    message: OutboxMessage,
    claim_token: Option<String>,
    claim_expires_at: Option<DateTime<Utc>>,
}

struct InMemoryOutboxRepository {
    clock: Arc<FixedClock>,
    rows: Mutex<Vec<StoredRow>>,
}

impl InMemoryOutboxRepository {
    fn new(clock: Arc<FixedClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            rows: Mutex::new(Vec::new()),
        })
    }

    async fn status_of(&self, id: Uuid) -> Option<OutboxStatus> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|row| row.message.id == id)
            .map(|row| row.message.status)
    }

    async fn retry_count_of(&self, id: Uuid) -> Option<u32> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|row| row.message.id == id)
            .map(|row| row.message.retry_count)
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn enqueue(&self, event: &DomainEvent) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let message = OutboxMessage {
            id,
            event_type: event.event_type().to_owned(),
            payload: event.to_payload()?,
            status: OutboxStatus::Pending,
            retry_count: 0,
            created_at: self.clock.now(),
            processed_at: None,
            next_attempt_at: None,
            last_error: None,
        };

        self.rows.lock().await.push(StoredRow {
            message,
            claim_token: None,
            claim_expires_at: None,
        });

        Ok(id)
    }

    async fn claim_batch(
        &self,
        _claimant: &str,
        batch_size: usize,
        claim_seconds: u32,
        max_retries: u32,
    ) -> AppResult<Vec<ClaimedOutboxMessage>> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        rows.sort_by_key(|row| row.message.created_at);

        let mut claims = Vec::new();
        for row in rows.iter_mut() {
            if claims.len() >= batch_size {
                break;
            }

            let eligible = match row.message.status {
                OutboxStatus::Pending => true,
                OutboxStatus::Failed => {
                    row.message.retry_count < max_retries
                        && row
                            .message
                            .next_attempt_at
                            .is_none_or(|next_attempt_at| next_attempt_at <= now)
                }
                OutboxStatus::Processing => row
                    .claim_expires_at
                    .is_some_and(|claim_expires_at| claim_expires_at < now),
                OutboxStatus::Processed | OutboxStatus::DeadLettered => false,
            };
            if !eligible {
                continue;
            }

            let claim_token = Uuid::new_v4().to_string();
            row.message.status = OutboxStatus::Processing;
            row.claim_token = Some(claim_token.clone());
            row.claim_expires_at = Some(now + Duration::seconds(i64::from(claim_seconds)));
            claims.push(ClaimedOutboxMessage {
                message: row.message.clone(),
                claim_token,
            });
        }

        Ok(claims)
    }

    async fn mark_processed(&self, claim: &ClaimedOutboxMessage) -> AppResult<()> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| {
                row.message.id == claim.message.id
                    && row.claim_token.as_deref() == Some(claim.claim_token.as_str())
                    && row.message.status == OutboxStatus::Processing
            })
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "message '{}' is not held under the given claim",
                    claim.message.id
                ))
            })?;

        row.message.status = OutboxStatus::Processed;
        row.message.processed_at = Some(now);
        row.claim_token = None;
        row.claim_expires_at = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        claim: &ClaimedOutboxMessage,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| {
                row.message.id == claim.message.id
                    && row.claim_token.as_deref() == Some(claim.claim_token.as_str())
                    && row.message.status == OutboxStatus::Processing
            })
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "message '{}' is not held under the given claim",
                    claim.message.id
                ))
            })?;

        row.message.status = OutboxStatus::Failed;
        row.message.retry_count += 1;
        row.message.last_error = Some(error.to_owned());
        row.message.next_attempt_at = Some(next_attempt_at);
        row.claim_token = None;
        row.claim_expires_at = None;
        Ok(())
    }

    async fn promote_exhausted(&self, max_retries: u32) -> AppResult<u64> {
        let mut rows = self.rows.lock().await;
        let mut promoted = 0;
        for row in rows.iter_mut() {
            if row.message.status == OutboxStatus::Failed && row.message.retry_count >= max_retries
            {
                row.message.status = OutboxStatus::DeadLettered;
                promoted += 1;
            }
        }

        Ok(promoted)
    }

    async fn delete_terminal(
        &self,
        processed_before: DateTime<Utc>,
        dead_lettered_before: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| match row.message.status {
            OutboxStatus::Processed => row
                .message
                .processed_at
                .is_none_or(|processed_at| processed_at >= processed_before),
            OutboxStatus::DeadLettered => row.message.created_at >= dead_lettered_before,
            _ => true,
        });

        Ok((before - rows.len()) as u64)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<OutboxMessage>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|row| row.message.id == id)
            .map(|row| row.message.clone()))
    }

    async fn list_dead_lettered(&self, limit: usize) -> AppResult<Vec<OutboxMessage>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.message.status == OutboxStatus::DeadLettered)
            .take(limit)
            .map(|row| row.message.clone())
            .collect())
    }

    async fn replay(&self, id: Uuid) -> AppResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| {
                row.message.id == id && row.message.status == OutboxStatus::DeadLettered
            })
            .ok_or_else(|| {
                AppError::NotFound(format!("message '{id}' is not dead-lettered"))
            })?;

        row.message.status = OutboxStatus::Pending;
        row.message.retry_count = 0;
        row.message.next_attempt_at = None;
        row.message.last_error = None;
        Ok(())
    }

    async fn stats(&self) -> AppResult<OutboxStats> {
        let rows = self.rows.lock().await;
        let mut stats = OutboxStats::default();
        for row in rows.iter() {
            match row.message.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Processing => stats.processing += 1,
                OutboxStatus::Processed => stats.processed += 1,
                OutboxStatus::Failed => stats.failed += 1,
                OutboxStatus::DeadLettered => stats.dead_lettered += 1,
            }
        }

        Ok(stats)
    }
}

/// Publisher that fails the first `failures` attempts, then succeeds,
/// recording every successful publication in order.
struct ScriptedPublisher {
    failures_remaining: AtomicU32,
    published: Mutex<Vec<Uuid>>,
}

impl ScriptedPublisher {
    fn failing_times(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_remaining: AtomicU32::new(failures),
            published: Mutex::new(Vec::new()),
        })
    }

    fn reliable() -> Arc<Self> {
        Self::failing_times(0)
    }
}

#[async_trait]
impl EventPublisher for ScriptedPublisher {
    async fn publish(&self, message: &OutboxMessage) -> AppResult<()> {
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failed {
            return Err(AppError::PublishFailed(
                "message bus rejected the publication".to_owned(),
            ));
        }

        self.published.lock().await.push(message.id);
        Ok(())
    }
}

fn test_config() -> OutboxConfig {
    OutboxConfig {
        batch_size: 10,
        max_retries: 3,
        claim_seconds: 60,
        poll_interval_ms: 10,
        initial_retry_delay_seconds: 5,
        max_retry_delay_seconds: 900,
        processed_retention_hours: 24,
        dead_letter_retention_hours: 168,
    }
}

struct OutboxFixture {
    service: OutboxService,
    repository: Arc<InMemoryOutboxRepository>,
    publisher: Arc<ScriptedPublisher>,
    clock: Arc<FixedClock>,
}

fn fixture(publisher: Arc<ScriptedPublisher>) -> OutboxFixture {
    let clock = FixedClock::starting_at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single()
        .unwrap_or_else(Utc::now));
    let repository = InMemoryOutboxRepository::new(clock.clone());
    let service = match OutboxService::new(
        repository.clone(),
        publisher.clone(),
        clock.clone(),
        test_config(),
        "dispatcher-test",
    ) {
        Ok(service) => service,
        Err(error) => panic!("failed to build outbox service: {error}"),
    };

    OutboxFixture {
        service,
        repository,
        publisher,
        clock,
    }
}

fn sample_event() -> DomainEvent {
    DomainEvent::TenantStoreProvisioned {
        tenant_id: TenantId::new(),
        store_id: "store-1".to_owned(),
    }
}

async fn stage(fixture: &OutboxFixture) -> Uuid {
    match fixture.repository.enqueue(&sample_event()).await {
        Ok(id) => id,
        Err(error) => panic!("failed to stage message: {error}"),
    }
}

// Worst-case jittered delay for the configured curve at a given attempt,
// used to advance the clock far enough for the next claim.
fn past_backoff() -> Duration {
    Duration::seconds(2_000)
}

#[tokio::test]
async fn dispatch_publishes_and_marks_processed() {
    let fixture = fixture(ScriptedPublisher::reliable());
    let id = stage(&fixture).await;

    let outcome = fixture.service.dispatch_once().await;
    assert!(outcome.is_ok());
    if let Ok(outcome) = outcome {
        assert_eq!(outcome.claimed, 1);
        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.failed, 0);
    }

    assert_eq!(
        fixture.repository.status_of(id).await,
        Some(OutboxStatus::Processed)
    );
}

#[tokio::test]
async fn failed_publication_is_delayed_not_lost() {
    let fixture = fixture(ScriptedPublisher::failing_times(1));
    let id = stage(&fixture).await;

    let first = fixture.service.dispatch_once().await;
    assert!(first.is_ok_and(|outcome| outcome.failed == 1));
    assert_eq!(
        fixture.repository.status_of(id).await,
        Some(OutboxStatus::Failed)
    );
    assert_eq!(fixture.repository.retry_count_of(id).await, Some(1));

    // Backoff has not elapsed: the message is not yet eligible again.
    let premature = fixture.service.dispatch_once().await;
    assert!(premature.is_ok_and(|outcome| outcome.claimed == 0));

    fixture.clock.advance(past_backoff());
    let retry = fixture.service.dispatch_once().await;
    assert!(retry.is_ok_and(|outcome| outcome.published == 1));
    assert_eq!(
        fixture.repository.status_of(id).await,
        Some(OutboxStatus::Processed)
    );
}

#[tokio::test]
async fn exactly_max_retries_failures_dead_letter_the_message() {
    let fixture = fixture(ScriptedPublisher::failing_times(u32::MAX));
    let id = stage(&fixture).await;

    for _ in 0..3 {
        let outcome = fixture.service.dispatch_once().await;
        assert!(outcome.is_ok_and(|outcome| outcome.failed == 1));
        fixture.clock.advance(past_backoff());
    }

    assert_eq!(fixture.repository.retry_count_of(id).await, Some(3));
    let promoted = fixture.service.promote_dead_letters().await;
    assert_eq!(promoted.ok(), Some(1));
    assert_eq!(
        fixture.repository.status_of(id).await,
        Some(OutboxStatus::DeadLettered)
    );

    // Quarantined messages are excluded from the next dispatch batch.
    let after = fixture.service.dispatch_once().await;
    assert!(after.is_ok_and(|outcome| outcome.claimed == 0));

    let dead_letters = fixture.service.dead_letters(10).await;
    assert!(dead_letters.is_ok_and(|messages| messages.len() == 1));

    let stats = fixture.service.stats().await;
    assert!(stats.is_ok_and(|stats| stats.dead_lettered == 1 && stats.pending == 0));
}

#[tokio::test]
async fn one_fewer_failure_leaves_the_message_eligible() {
    let fixture = fixture(ScriptedPublisher::failing_times(u32::MAX));
    let id = stage(&fixture).await;

    for _ in 0..2 {
        let outcome = fixture.service.dispatch_once().await;
        assert!(outcome.is_ok_and(|outcome| outcome.failed == 1));
        fixture.clock.advance(past_backoff());
    }

    assert_eq!(fixture.repository.retry_count_of(id).await, Some(2));
    let promoted = fixture.service.promote_dead_letters().await;
    assert_eq!(promoted.ok(), Some(0));

    let next = fixture.service.dispatch_once().await;
    assert!(next.is_ok_and(|outcome| outcome.claimed == 1));
}

#[tokio::test]
async fn stale_claim_is_reclaimed_after_dispatcher_death() {
    let fixture = fixture(ScriptedPublisher::reliable());
    let id = stage(&fixture).await;

    // A dispatcher claims the message and dies before publishing.
    let abandoned = fixture
        .repository
        .claim_batch("dispatcher-dead", 10, 60, 3)
        .await;
    assert!(abandoned.is_ok_and(|claims| claims.len() == 1));
    assert_eq!(
        fixture.repository.status_of(id).await,
        Some(OutboxStatus::Processing)
    );

    // While the claim is fresh no other dispatcher may take it.
    let blocked = fixture.service.dispatch_once().await;
    assert!(blocked.is_ok_and(|outcome| outcome.claimed == 0));

    // Once the staleness window passes the message is claimable again and
    // eventually processed: at-least-once, never stuck in Processing.
    fixture.clock.advance(Duration::seconds(61));
    let recovered = fixture.service.dispatch_once().await;
    assert!(recovered.is_ok_and(|outcome| outcome.published == 1));
    assert_eq!(
        fixture.repository.status_of(id).await,
        Some(OutboxStatus::Processed)
    );
}

#[tokio::test]
async fn cleanup_deletes_only_terminal_messages() {
    let fixture = fixture(ScriptedPublisher::reliable());
    let dead_lettered = stage(&fixture).await;

    // Drive the first message to DeadLettered with manual failure marks.
    for _ in 0..3 {
        let claims = fixture
            .repository
            .claim_batch("dispatcher-test", 1, 60, 3)
            .await;
        let Ok(claims) = claims else {
            panic!("claim failed");
        };
        let Some(claim) = claims.into_iter().next() else {
            panic!("expected one claim");
        };
        assert_eq!(claim.message.id, dead_lettered);
        let marked = fixture
            .repository
            .mark_failed(&claim, "bus down", fixture.clock.now())
            .await;
        assert!(marked.is_ok());
    }
    let promoted = fixture.service.promote_dead_letters().await;
    assert_eq!(promoted.ok(), Some(1));

    // A processed message to be reclaimed by retention, and a message that
    // stays pending and must survive cleanup no matter how old it gets.
    let processed = stage(&fixture).await;
    let outcome = fixture.service.dispatch_once().await;
    assert!(outcome.is_ok_and(|outcome| outcome.published == 1));
    let pending = stage(&fixture).await;

    // Jump past both retention windows.
    fixture.clock.advance(Duration::hours(200));
    let deleted = fixture.service.cleanup_once().await;
    assert_eq!(deleted.ok(), Some(2));

    assert_eq!(fixture.repository.status_of(processed).await, None);
    assert_eq!(fixture.repository.status_of(dead_lettered).await, None);
    assert_eq!(
        fixture.repository.status_of(pending).await,
        Some(OutboxStatus::Pending)
    );
}

#[tokio::test]
async fn replay_returns_dead_letter_to_the_queue() {
    let fixture = fixture(ScriptedPublisher::failing_times(3));
    let id = stage(&fixture).await;

    for _ in 0..3 {
        let outcome = fixture.service.dispatch_once().await;
        assert!(outcome.is_ok_and(|outcome| outcome.failed == 1));
        fixture.clock.advance(past_backoff());
    }
    let promoted = fixture.service.promote_dead_letters().await;
    assert_eq!(promoted.ok(), Some(1));

    let replayed = fixture.service.replay_dead_lettered(id).await;
    assert!(replayed.is_ok());
    assert_eq!(fixture.repository.retry_count_of(id).await, Some(0));

    let outcome = fixture.service.dispatch_once().await;
    assert!(outcome.is_ok_and(|outcome| outcome.published == 1));
    assert_eq!(
        fixture.repository.status_of(id).await,
        Some(OutboxStatus::Processed)
    );
}

#[tokio::test]
async fn batches_preserve_staging_order() {
    let fixture = fixture(ScriptedPublisher::reliable());
    let first = stage(&fixture).await;
    fixture.clock.advance(Duration::seconds(1));
    let second = stage(&fixture).await;
    fixture.clock.advance(Duration::seconds(1));
    let third = stage(&fixture).await;

    let outcome = fixture.service.dispatch_once().await;
    assert!(outcome.is_ok_and(|outcome| outcome.published == 3));

    let published = fixture.publisher.published.lock().await;
    assert_eq!(published.as_slice(), [first, second, third]);
}

#[tokio::test]
async fn replaying_a_live_message_is_rejected() {
    let fixture = fixture(ScriptedPublisher::reliable());
    let id = stage(&fixture).await;

    let result = fixture.service.replay_dead_lettered(id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
