use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatewarden_core::{AppError, AppResult, TenantId};
use gatewarden_domain::{DomainEvent, OutboxMessage, RoleDefinition};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::authz_ports::{
    AuthorizationCache, ClaimedOutboxMessage, EvaluationEngine, OutboxRepository, OutboxStats,
    RelationTuple, RoleRepository, StoreId, TenantStoreInsert, TenantStoreMapping,
    TenantStoreRepository,
};
use crate::retry::RetryPolicy;

use super::StoreRouterService;

#[derive(Default)]
struct FakeTenantStoreRepository {
    mappings: Mutex<HashMap<Uuid, TenantStoreMapping>>,
    // Number of upcoming find calls that report a miss, used to open a
    // provisioning race window between find and insert.
    suppress_finds: AtomicU32,
}

#[async_trait]
impl TenantStoreRepository for FakeTenantStoreRepository {
    async fn find(&self, tenant_id: TenantId) -> AppResult<Option<TenantStoreMapping>> {
        if self
            .suppress_finds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            return Ok(None);
        }

        Ok(self.mappings.lock().await.get(&tenant_id.as_uuid()).cloned())
    }

    async fn insert(
        &self,
        tenant_id: TenantId,
        store_id: &StoreId,
    ) -> AppResult<TenantStoreInsert> {
        let mut mappings = self.mappings.lock().await;
        if let Some(existing) = mappings.get(&tenant_id.as_uuid()) {
            return Ok(TenantStoreInsert::AlreadyExists(existing.clone()));
        }

        mappings.insert(
            tenant_id.as_uuid(),
            TenantStoreMapping {
                tenant_id,
                store_id: store_id.clone(),
                model_fingerprint: None,
            },
        );

        Ok(TenantStoreInsert::Inserted)
    }

    async fn update_model_fingerprint(
        &self,
        tenant_id: TenantId,
        fingerprint: &str,
    ) -> AppResult<()> {
        let mut mappings = self.mappings.lock().await;
        let mapping = mappings.get_mut(&tenant_id.as_uuid()).ok_or_else(|| {
            AppError::NotFound(format!("no mapping for tenant '{tenant_id}'"))
        })?;
        mapping.model_fingerprint = Some(fingerprint.to_owned());
        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId) -> AppResult<()> {
        self.mappings.lock().await.remove(&tenant_id.as_uuid());
        Ok(())
    }
}

#[derive(Default)]
struct FakeEvaluationEngine {
    next_store: AtomicU32,
    create_calls: AtomicU32,
    write_model_calls: AtomicU32,
    deleted_stores: Mutex<Vec<String>>,
    fail_all: bool,
}

impl FakeEvaluationEngine {
    fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    fn unavailable(&self) -> AppError {
        AppError::StoreUnavailable("evaluation engine is unreachable".to_owned())
    }
}

#[async_trait]
impl EvaluationEngine for FakeEvaluationEngine {
    async fn create_store(&self, _name: &str) -> AppResult<StoreId> {
        if self.fail_all {
            return Err(self.unavailable());
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let index = self.next_store.fetch_add(1, Ordering::SeqCst);
        Ok(StoreId::new(format!("store-{index}")))
    }

    async fn delete_store(&self, store_id: &StoreId) -> AppResult<()> {
        if self.fail_all {
            return Err(self.unavailable());
        }
        self.deleted_stores
            .lock()
            .await
            .push(store_id.as_str().to_owned());
        Ok(())
    }

    async fn write_authorization_model(
        &self,
        _store_id: &StoreId,
        _model: &serde_json::Value,
    ) -> AppResult<String> {
        if self.fail_all {
            return Err(self.unavailable());
        }
        self.write_model_calls.fetch_add(1, Ordering::SeqCst);
        Ok("model-1".to_owned())
    }

    async fn check(&self, _store_id: &StoreId, _tuple: &RelationTuple) -> AppResult<bool> {
        if self.fail_all {
            return Err(self.unavailable());
        }
        Ok(false)
    }

    async fn write_tuple(&self, _store_id: &StoreId, _tuple: &RelationTuple) -> AppResult<()> {
        if self.fail_all {
            return Err(self.unavailable());
        }
        Ok(())
    }

    async fn delete_tuple(&self, _store_id: &StoreId, _tuple: &RelationTuple) -> AppResult<()> {
        if self.fail_all {
            return Err(self.unavailable());
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeRoleRepository {
    seeded: Mutex<HashMap<Uuid, Vec<RoleDefinition>>>,
}

#[async_trait]
impl RoleRepository for FakeRoleRepository {
    async fn find(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<RoleDefinition>> {
        Ok(self
            .seeded
            .lock()
            .await
            .get(&tenant_id.as_uuid())
            .and_then(|roles| roles.iter().find(|role| role.role_id() == role_id).cloned()))
    }

    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<RoleDefinition>> {
        Ok(self
            .seeded
            .lock()
            .await
            .get(&tenant_id.as_uuid())
            .cloned()
            .unwrap_or_default())
    }

    async fn seed_builtin(&self, tenant_id: TenantId, roles: &[RoleDefinition]) -> AppResult<()> {
        self.seeded
            .lock()
            .await
            .insert(tenant_id.as_uuid(), roles.to_vec());
        Ok(())
    }

    async fn create_custom(&self, _tenant_id: TenantId, _role: &RoleDefinition) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeOutboxRepository {
    events: Mutex<Vec<DomainEvent>>,
}

#[async_trait]
impl OutboxRepository for FakeOutboxRepository {
    async fn enqueue(&self, event: &DomainEvent) -> AppResult<Uuid> {
        self.events.lock().await.push(event.clone());
        Ok(Uuid::new_v4())
    }

    async fn claim_batch(
        &self,
        _claimant: &str,
        _batch_size: usize,
        _claim_seconds: u32,
        _max_retries: u32,
    ) -> AppResult<Vec<ClaimedOutboxMessage>> {
        Ok(Vec::new())
    }

    async fn mark_processed(&self, _claim: &ClaimedOutboxMessage) -> AppResult<()> {
        Ok(())
    }

    async fn mark_failed(
        &self,
        _claim: &ClaimedOutboxMessage,
        _error: &str,
        _next_attempt_at: DateTime<Utc>,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn promote_exhausted(&self, _max_retries: u32) -> AppResult<u64> {
        Ok(0)
    }

    async fn delete_terminal(
        &self,
        _processed_before: DateTime<Utc>,
        _dead_lettered_before: DateTime<Utc>,
    ) -> AppResult<u64> {
        Ok(0)
    }

    async fn find(&self, _id: Uuid) -> AppResult<Option<OutboxMessage>> {
        Ok(None)
    }

    async fn list_dead_lettered(&self, _limit: usize) -> AppResult<Vec<OutboxMessage>> {
        Ok(Vec::new())
    }

    async fn replay(&self, _id: Uuid) -> AppResult<()> {
        Ok(())
    }

    async fn stats(&self) -> AppResult<OutboxStats> {
        Ok(OutboxStats::default())
    }
}

#[derive(Default)]
struct NoopCache;

#[async_trait]
impl AuthorizationCache for NoopCache {
    async fn get(&self, _key: &str) -> AppResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u32) -> AppResult<()> {
        Ok(())
    }

    async fn invalidate(&self, _key: &str) -> AppResult<()> {
        Ok(())
    }

    async fn invalidate_prefix(&self, _prefix: &str) -> AppResult<()> {
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        timeout_ms: 1_000,
    }
}

struct RouterFixture {
    service: StoreRouterService,
    stores: Arc<FakeTenantStoreRepository>,
    engine: Arc<FakeEvaluationEngine>,
    roles: Arc<FakeRoleRepository>,
    outbox: Arc<FakeOutboxRepository>,
}

fn fixture_with_engine(engine: FakeEvaluationEngine, auto_provision: bool) -> RouterFixture {
    let stores = Arc::new(FakeTenantStoreRepository::default());
    let engine = Arc::new(engine);
    let roles = Arc::new(FakeRoleRepository::default());
    let outbox = Arc::new(FakeOutboxRepository::default());
    let service = StoreRouterService::new(
        stores.clone(),
        engine.clone(),
        roles.clone(),
        outbox.clone(),
        Arc::new(NoopCache),
        fast_retry(),
        auto_provision,
    );

    RouterFixture {
        service,
        stores,
        engine,
        roles,
        outbox,
    }
}

#[tokio::test]
async fn create_store_returns_existing_id_on_repeat() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::default(), false);
    let tenant_id = TenantId::new();

    let first = fixture.service.create_store(tenant_id).await;
    let second = fixture.service.create_store(tenant_id).await;

    assert!(first.is_ok());
    assert_eq!(first.ok(), second.ok());
    assert_eq!(fixture.engine.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_create_store_yields_one_store_id() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::default(), false);
    let tenant_id = TenantId::new();

    let left = fixture.service.clone();
    let right = fixture.service.clone();
    let (first, second) = tokio::join!(left.create_store(tenant_id), right.create_store(tenant_id));

    let first = first.ok();
    let second = second.ok();
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn lost_provisioning_race_removes_orphan_store() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::default(), false);
    let tenant_id = TenantId::new();

    let winner = StoreId::new("store-winner");
    let inserted = fixture.stores.insert(tenant_id, &winner).await;
    assert!(matches!(inserted, Ok(TenantStoreInsert::Inserted)));

    // The loser checked for a mapping before the winner committed, so its
    // engine store is created and the insert hits the unique constraint.
    fixture.stores.suppress_finds.store(1, Ordering::SeqCst);
    let resolved = fixture.service.create_store(tenant_id).await;
    assert_eq!(resolved.ok(), Some(winner));

    let deleted_stores = fixture.engine.deleted_stores.lock().await;
    assert_eq!(deleted_stores.as_slice(), ["store-0"]);
}

#[tokio::test]
async fn client_without_store_fails_closed_when_auto_provision_disabled() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::default(), false);

    let result = fixture.service.client(TenantId::new()).await;
    assert!(matches!(result, Err(AppError::StoreNotFound(_))));
}

#[tokio::test]
async fn auto_provision_creates_store_and_seeds_roles() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::default(), true);
    let tenant_id = TenantId::new();

    let client = fixture.service.client(tenant_id).await;
    assert!(client.is_ok());
    assert_eq!(fixture.engine.write_model_calls.load(Ordering::SeqCst), 1);

    let seeded = fixture.roles.seeded.lock().await;
    let roles = seeded.get(&tenant_id.as_uuid());
    assert!(roles.is_some_and(|roles| !roles.is_empty()));
}

#[tokio::test]
async fn reinitializing_unchanged_model_skips_engine_write() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::default(), false);
    let tenant_id = TenantId::new();

    let first = fixture.service.initialize_model(tenant_id).await;
    let second = fixture.service.initialize_model(tenant_id).await;

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(fixture.engine.write_model_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_store_unavailable() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::failing(), false);

    let result = fixture.service.create_store(TenantId::new()).await;
    assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
}

#[tokio::test]
async fn provisioning_stages_store_event() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::default(), false);
    let tenant_id = TenantId::new();

    let created = fixture.service.create_store(tenant_id).await;
    assert!(created.is_ok());

    let events = fixture.outbox.events.lock().await;
    assert!(events.iter().any(|event| matches!(
        event,
        DomainEvent::TenantStoreProvisioned { tenant_id: event_tenant, .. }
            if *event_tenant == tenant_id
    )));
}

#[tokio::test]
async fn delete_store_removes_mapping_and_stages_event() {
    let fixture = fixture_with_engine(FakeEvaluationEngine::default(), false);
    let tenant_id = TenantId::new();

    let created = fixture.service.create_store(tenant_id).await;
    assert!(created.is_ok());

    let deleted = fixture.service.delete_store(tenant_id).await;
    assert!(deleted.is_ok());

    let lookup = fixture.service.store_id(tenant_id).await;
    assert_eq!(lookup.ok(), Some(None));

    let deleted_stores = fixture.engine.deleted_stores.lock().await;
    assert_eq!(deleted_stores.len(), 1);

    let events = fixture.outbox.events.lock().await;
    assert!(events.iter().any(|event| matches!(
        event,
        DomainEvent::TenantStoreDeleted { tenant_id: event_tenant, .. }
            if *event_tenant == tenant_id
    )));
}
