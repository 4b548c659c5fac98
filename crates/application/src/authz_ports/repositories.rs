use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatewarden_core::{AppResult, Scope, TenantId};
use gatewarden_domain::{DomainEvent, OutboxMessage, PrincipalRef, RoleAssignment, RoleDefinition};
use uuid::Uuid;

use super::engine::StoreId;

/// One tenant-to-store mapping row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantStoreMapping {
    /// Mapped tenant.
    pub tenant_id: TenantId,
    /// Store identifier in the evaluation engine.
    pub store_id: StoreId,
    /// Content fingerprint of the last written authorization model, used to
    /// make model re-initialization a no-op when unchanged.
    pub model_fingerprint: Option<String>,
}

/// Outcome of a tenant-store mapping insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantStoreInsert {
    /// The mapping was created by this call.
    Inserted,
    /// Another caller won the provisioning race; the existing mapping is
    /// returned so both callers observe the same store id.
    AlreadyExists(TenantStoreMapping),
}

/// Repository port for the tenant-to-store mapping.
#[async_trait]
pub trait TenantStoreRepository: Send + Sync {
    /// Returns the mapping for a tenant, if one exists.
    async fn find(&self, tenant_id: TenantId) -> AppResult<Option<TenantStoreMapping>>;

    /// Inserts a mapping; a concurrent insert for the same tenant resolves
    /// through the unique constraint into
    /// [`TenantStoreInsert::AlreadyExists`].
    async fn insert(&self, tenant_id: TenantId, store_id: &StoreId)
    -> AppResult<TenantStoreInsert>;

    /// Records the fingerprint of the authorization model written to the
    /// tenant's store.
    async fn update_model_fingerprint(
        &self,
        tenant_id: TenantId,
        fingerprint: &str,
    ) -> AppResult<()>;

    /// Removes the mapping during tenant offboarding.
    async fn delete(&self, tenant_id: TenantId) -> AppResult<()>;
}

/// Repository port for role definitions.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Returns one role definition, if present.
    async fn find(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<RoleDefinition>>;

    /// Lists all role definitions for a tenant.
    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<RoleDefinition>>;

    /// Upserts the built-in role set; safe to call repeatedly.
    async fn seed_builtin(&self, tenant_id: TenantId, roles: &[RoleDefinition]) -> AppResult<()>;

    /// Creates a custom role; fails with `Conflict` when the role id is
    /// already taken.
    async fn create_custom(&self, tenant_id: TenantId, role: &RoleDefinition) -> AppResult<()>;
}

/// Repository port for role assignments.
///
/// The `*_with_event` operations persist the business row and the outbox
/// message in one transaction so the event is recorded iff the business
/// change committed.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Inserts an assignment and stages its event atomically; fails with
    /// `Conflict` when the `(tenant, principal, role, scope)` tuple already
    /// holds an assignment.
    async fn create_with_event(
        &self,
        assignment: &RoleAssignment,
        event: &DomainEvent,
    ) -> AppResult<()>;

    /// Returns one assignment, if present.
    async fn find(
        &self,
        tenant_id: TenantId,
        assignment_id: Uuid,
    ) -> AppResult<Option<RoleAssignment>>;

    /// Deletes an assignment and stages its event atomically; fails with
    /// `NotFound` when the assignment no longer exists.
    async fn delete_with_event(
        &self,
        tenant_id: TenantId,
        assignment_id: Uuid,
        event: &DomainEvent,
    ) -> AppResult<()>;

    /// Lists assignments for a principal at one exact scope that are still
    /// active at `now`; expired rows are excluded even when physically
    /// present.
    async fn list_active_for_principal_at_scope(
        &self,
        tenant_id: TenantId,
        principal: &PrincipalRef,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Physically removes up to `limit` assignments expired at `now`,
    /// staging an `AssignmentExpired` event per row in the same
    /// transaction; returns the removed assignments.
    async fn sweep_expired_with_events(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<RoleAssignment>>;
}

/// One message claimed by a dispatcher.
///
/// The claim token is compared on finalization so a dispatcher that lost
/// its claim to the staleness window cannot overwrite a newer claim.
#[derive(Debug, Clone)]
pub struct ClaimedOutboxMessage {
    /// The claimed message.
    pub message: OutboxMessage,
    /// Claim token assigned when the batch was claimed.
    pub claim_token: String,
}

/// Aggregate outbox counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutboxStats {
    /// Messages awaiting a first dispatch attempt.
    pub pending: i64,
    /// Messages currently claimed.
    pub processing: i64,
    /// Successfully published messages.
    pub processed: i64,
    /// Messages awaiting a retry.
    pub failed: i64,
    /// Quarantined messages.
    pub dead_lettered: i64,
}

/// Repository port for the durable outbox.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Stages one event outside any business transaction (used for
    /// fire-and-forget telemetry such as `permission.checked`).
    async fn enqueue(&self, event: &DomainEvent) -> AppResult<Uuid>;

    /// Atomically claims up to `batch_size` eligible messages for
    /// `claimant`: pending messages, failed messages whose backoff delay
    /// has passed and whose `retry_count` is below `max_retries`, and
    /// processing messages whose claim expired (dispatcher died
    /// mid-flight). Claimed messages are flipped to `Processing` in the
    /// same statement so two dispatchers never claim the same message.
    async fn claim_batch(
        &self,
        claimant: &str,
        batch_size: usize,
        claim_seconds: u32,
        max_retries: u32,
    ) -> AppResult<Vec<ClaimedOutboxMessage>>;

    /// Marks a claimed message as published; fails with `Conflict` when the
    /// claim token no longer matches.
    async fn mark_processed(&self, claim: &ClaimedOutboxMessage) -> AppResult<()>;

    /// Records a failed publication attempt: increments `retry_count`,
    /// stores `last_error`, schedules the next attempt, and reverts the
    /// message to `Failed`.
    async fn mark_failed(
        &self,
        claim: &ClaimedOutboxMessage,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Quarantines failed messages whose retry budget is exhausted;
    /// returns the number of messages dead-lettered.
    async fn promote_exhausted(&self, max_retries: u32) -> AppResult<u64>;

    /// Deletes terminal messages past their retention windows; never
    /// touches a non-terminal message.
    async fn delete_terminal(
        &self,
        processed_before: DateTime<Utc>,
        dead_lettered_before: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Returns one message by id.
    async fn find(&self, id: Uuid) -> AppResult<Option<OutboxMessage>>;

    /// Lists quarantined messages for operator inspection.
    async fn list_dead_lettered(&self, limit: usize) -> AppResult<Vec<OutboxMessage>>;

    /// Returns a dead-lettered message to `Pending` with a fresh retry
    /// budget; fails with `NotFound` when the message is not dead-lettered.
    async fn replay(&self, id: Uuid) -> AppResult<()>;

    /// Returns aggregate counters per status.
    async fn stats(&self) -> AppResult<OutboxStats>;
}
