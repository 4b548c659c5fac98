use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatewarden_application::{ClaimedOutboxMessage, OutboxRepository, OutboxStats};
use gatewarden_core::{AppError, AppResult};
use gatewarden_domain::{DomainEvent, OutboxMessage, OutboxStatus};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL-backed durable outbox.
///
/// Claims are atomic at the persistence layer: the candidate selection and
/// the status flip to `processing` happen in one statement with
/// `FOR UPDATE SKIP LOCKED`, so dispatchers in separate processes never
/// claim the same message.
#[derive(Clone)]
pub struct PostgresOutboxRepository {
    pool: PgPool,
}

impl PostgresOutboxRepository {
    /// Creates an outbox repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct OutboxMessageRow {
    id: Uuid,
    event_type: String,
    payload: Value,
    status: String,
    retry_count: i32,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug, FromRow)]
struct ClaimedOutboxMessageRow {
    id: Uuid,
    event_type: String,
    payload: Value,
    retry_count: i32,
    created_at: DateTime<Utc>,
    next_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    claim_token: String,
}

#[derive(Debug, FromRow)]
struct OutboxStatsRow {
    pending: i64,
    processing: i64,
    processed: i64,
    failed: i64,
    dead_lettered: i64,
}

#[async_trait]
impl OutboxRepository for PostgresOutboxRepository {
    async fn enqueue(&self, event: &DomainEvent) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO outbox_messages (id, event_type, payload, status, retry_count, created_at)
            VALUES ($1, $2, $3, 'pending', 0, now())
            "#,
        )
        .bind(id)
        .bind(event.event_type())
        .bind(event.to_payload()?)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to enqueue '{}' outbox message: {error}",
                event.event_type()
            ))
        })?;

        Ok(id)
    }

    async fn claim_batch(
        &self,
        claimant: &str,
        batch_size: usize,
        claim_seconds: u32,
        max_retries: u32,
    ) -> AppResult<Vec<ClaimedOutboxMessage>> {
        let rows = sqlx::query_as::<_, ClaimedOutboxMessageRow>(
            r#"
            WITH candidate_messages AS (
                SELECT id
                FROM outbox_messages
                WHERE (
                        status = 'pending'
                        OR (
                            status = 'failed'
                            AND retry_count < $4
                            AND (next_attempt_at IS NULL OR next_attempt_at <= now())
                        )
                        OR (status = 'processing' AND claim_expires_at < now())
                      )
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            ),
            claimed_messages AS (
                UPDATE outbox_messages messages
                SET
                    status = 'processing',
                    claimed_by = $2,
                    claim_token = gen_random_uuid()::TEXT,
                    claim_expires_at = now() + make_interval(secs => $3::INT)
                FROM candidate_messages
                WHERE messages.id = candidate_messages.id
                RETURNING
                    messages.id,
                    messages.event_type,
                    messages.payload,
                    messages.retry_count,
                    messages.created_at,
                    messages.next_attempt_at,
                    messages.last_error,
                    messages.claim_token
            )
            SELECT
                id,
                event_type,
                payload,
                retry_count,
                created_at,
                next_attempt_at,
                last_error,
                claim_token
            FROM claimed_messages
            ORDER BY created_at ASC
            "#,
        )
        .bind(i64::try_from(batch_size).map_err(|error| {
            AppError::Validation(format!("invalid outbox batch_size: {error}"))
        })?)
        .bind(claimant)
        .bind(i32::try_from(claim_seconds).map_err(|error| {
            AppError::Validation(format!("invalid outbox claim_seconds: {error}"))
        })?)
        .bind(i32::try_from(max_retries).map_err(|error| {
            AppError::Validation(format!("invalid outbox max_retries: {error}"))
        })?)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to claim outbox batch for '{claimant}': {error}"
            ))
        })?;

        rows.into_iter().map(claimed_message_from_row).collect()
    }

    async fn mark_processed(&self, claim: &ClaimedOutboxMessage) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET
                status = 'processed',
                processed_at = now(),
                claimed_by = NULL,
                claim_token = NULL,
                claim_expires_at = NULL
            WHERE id = $1
              AND claim_token = $2
              AND status = 'processing'
            "#,
        )
        .bind(claim.message.id)
        .bind(claim.claim_token.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to mark outbox message '{}' processed: {error}",
                claim.message.id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "outbox message '{}' is not held under the given claim",
                claim.message.id
            )));
        }

        Ok(())
    }

    async fn mark_failed(
        &self,
        claim: &ClaimedOutboxMessage,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET
                status = 'failed',
                retry_count = retry_count + 1,
                last_error = $3,
                next_attempt_at = $4,
                claimed_by = NULL,
                claim_token = NULL,
                claim_expires_at = NULL
            WHERE id = $1
              AND claim_token = $2
              AND status = 'processing'
            "#,
        )
        .bind(claim.message.id)
        .bind(claim.claim_token.as_str())
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await
        .map_err(|db_error| {
            AppError::Internal(format!(
                "failed to mark outbox message '{}' failed: {db_error}",
                claim.message.id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "outbox message '{}' is not held under the given claim",
                claim.message.id
            )));
        }

        Ok(())
    }

    async fn promote_exhausted(&self, max_retries: u32) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = 'dead_lettered'
            WHERE status = 'failed' AND retry_count >= $1
            "#,
        )
        .bind(i32::try_from(max_retries).map_err(|error| {
            AppError::Validation(format!("invalid outbox max_retries: {error}"))
        })?)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to dead-letter exhausted messages: {error}"))
        })?;

        Ok(result.rows_affected())
    }

    async fn delete_terminal(
        &self,
        processed_before: DateTime<Utc>,
        dead_lettered_before: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM outbox_messages
            WHERE (status = 'processed' AND processed_at < $1)
               OR (status = 'dead_lettered' AND created_at < $2)
            "#,
        )
        .bind(processed_before)
        .bind(dead_lettered_before)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to clean up terminal outbox messages: {error}"))
        })?;

        Ok(result.rows_affected())
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<OutboxMessage>> {
        let row = sqlx::query_as::<_, OutboxMessageRow>(
            r#"
            SELECT
                id,
                event_type,
                payload,
                status,
                retry_count,
                created_at,
                processed_at,
                next_attempt_at,
                last_error
            FROM outbox_messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find outbox message '{id}': {error}"))
        })?;

        row.map(outbox_message_from_row).transpose()
    }

    async fn list_dead_lettered(&self, limit: usize) -> AppResult<Vec<OutboxMessage>> {
        let rows = sqlx::query_as::<_, OutboxMessageRow>(
            r#"
            SELECT
                id,
                event_type,
                payload,
                status,
                retry_count,
                created_at,
                processed_at,
                next_attempt_at,
                last_error
            FROM outbox_messages
            WHERE status = 'dead_lettered'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid dead-letter list limit: {error}"))
        })?)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list dead-lettered messages: {error}"))
        })?;

        rows.into_iter().map(outbox_message_from_row).collect()
    }

    async fn replay(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET
                status = 'pending',
                retry_count = 0,
                next_attempt_at = NULL,
                last_error = NULL
            WHERE id = $1 AND status = 'dead_lettered'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to replay outbox message '{id}': {error}"))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "outbox message '{id}' is not dead-lettered"
            )));
        }

        Ok(())
    }

    async fn stats(&self) -> AppResult<OutboxStats> {
        let row = sqlx::query_as::<_, OutboxStatsRow>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0) AS processing,
                COALESCE(SUM(CASE WHEN status = 'processed' THEN 1 ELSE 0 END), 0) AS processed,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(CASE WHEN status = 'dead_lettered' THEN 1 ELSE 0 END), 0) AS dead_lettered
            FROM outbox_messages
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load outbox stats: {error}"))
        })?;

        Ok(OutboxStats {
            pending: row.pending,
            processing: row.processing,
            processed: row.processed,
            failed: row.failed,
            dead_lettered: row.dead_lettered,
        })
    }
}

fn outbox_message_from_row(row: OutboxMessageRow) -> AppResult<OutboxMessage> {
    Ok(OutboxMessage {
        id: row.id,
        event_type: row.event_type,
        payload: row.payload,
        status: OutboxStatus::parse(row.status.as_str())?,
        retry_count: u32::try_from(row.retry_count).map_err(|error| {
            AppError::Internal(format!(
                "invalid outbox retry_count for message '{}': {error}",
                row.id
            ))
        })?,
        created_at: row.created_at,
        processed_at: row.processed_at,
        next_attempt_at: row.next_attempt_at,
        last_error: row.last_error,
    })
}

fn claimed_message_from_row(row: ClaimedOutboxMessageRow) -> AppResult<ClaimedOutboxMessage> {
    Ok(ClaimedOutboxMessage {
        message: OutboxMessage {
            id: row.id,
            event_type: row.event_type,
            payload: row.payload,
            status: OutboxStatus::Processing,
            retry_count: u32::try_from(row.retry_count).map_err(|error| {
                AppError::Internal(format!(
                    "invalid outbox retry_count for message '{}': {error}",
                    row.id
                ))
            })?,
            created_at: row.created_at,
            processed_at: None,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
        },
        claim_token: row.claim_token,
    })
}
