//! Per-tenant policy-store routing and lifecycle.

mod model;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use gatewarden_core::{AppError, AppResult, TenantId};
use gatewarden_domain::{DomainEvent, builtin_roles};
use tracing::{info, warn};

use crate::authz_ports::{
    AuthorizationCache, EvaluationEngine, OutboxRepository, RelationTuple, RoleRepository,
    StoreId, TenantStoreInsert, TenantStoreRepository,
};
use crate::cache_keys;
use crate::retry::RetryPolicy;

pub use model::{authorization_model, model_fingerprint};

/// Evaluation-engine client bound to one tenant's store.
///
/// Every call runs under the router's bounded retry policy and per-call
/// timeout; exhausted retries surface as
/// [`AppError::StoreUnavailable`].
#[derive(Clone)]
pub struct TenantEvaluationClient {
    store_id: StoreId,
    engine: Arc<dyn EvaluationEngine>,
    retry: RetryPolicy,
}

impl TenantEvaluationClient {
    /// Returns the store this client is bound to.
    #[must_use]
    pub fn store_id(&self) -> &StoreId {
        &self.store_id
    }

    /// Evaluates one relationship tuple.
    pub async fn check(&self, tuple: &RelationTuple) -> AppResult<bool> {
        self.retry
            .run("evaluation engine check", || {
                let engine = Arc::clone(&self.engine);
                let store_id = self.store_id.clone();
                let tuple = tuple.clone();
                async move { engine.check(&store_id, &tuple).await }
            })
            .await
    }

    /// Writes one relationship tuple.
    pub async fn write_tuple(&self, tuple: &RelationTuple) -> AppResult<()> {
        self.retry
            .run("evaluation engine tuple write", || {
                let engine = Arc::clone(&self.engine);
                let store_id = self.store_id.clone();
                let tuple = tuple.clone();
                async move { engine.write_tuple(&store_id, &tuple).await }
            })
            .await
    }

    /// Deletes one relationship tuple.
    pub async fn delete_tuple(&self, tuple: &RelationTuple) -> AppResult<()> {
        self.retry
            .run("evaluation engine tuple delete", || {
                let engine = Arc::clone(&self.engine);
                let store_id = self.store_id.clone();
                let tuple = tuple.clone();
                async move { engine.delete_tuple(&store_id, &tuple).await }
            })
            .await
    }
}

/// Routes each tenant to its isolated policy store in the evaluation
/// engine and manages store lifecycle.
#[derive(Clone)]
pub struct StoreRouterService {
    stores: Arc<dyn TenantStoreRepository>,
    engine: Arc<dyn EvaluationEngine>,
    roles: Arc<dyn RoleRepository>,
    outbox: Arc<dyn OutboxRepository>,
    cache: Arc<dyn AuthorizationCache>,
    retry: RetryPolicy,
    auto_provision: bool,
}

impl StoreRouterService {
    /// Creates a store router.
    ///
    /// With `auto_provision` disabled, [`StoreRouterService::client`] fails
    /// with `StoreNotFound` for tenants that have no store yet.
    #[must_use]
    pub fn new(
        stores: Arc<dyn TenantStoreRepository>,
        engine: Arc<dyn EvaluationEngine>,
        roles: Arc<dyn RoleRepository>,
        outbox: Arc<dyn OutboxRepository>,
        cache: Arc<dyn AuthorizationCache>,
        retry: RetryPolicy,
        auto_provision: bool,
    ) -> Self {
        Self {
            stores,
            engine,
            roles,
            outbox,
            cache,
            retry,
            auto_provision,
        }
    }

    /// Returns an evaluation client bound to the tenant's store.
    pub async fn client(&self, tenant_id: TenantId) -> AppResult<TenantEvaluationClient> {
        if let Some(mapping) = self.stores.find(tenant_id).await? {
            return Ok(self.client_for(mapping.store_id));
        }

        if !self.auto_provision {
            return Err(AppError::StoreNotFound(format!(
                "no policy store exists for tenant '{tenant_id}'"
            )));
        }

        self.initialize_model(tenant_id).await?;
        let mapping = self.stores.find(tenant_id).await?.ok_or_else(|| {
            AppError::Internal(format!(
                "policy store mapping for tenant '{tenant_id}' vanished after provisioning"
            ))
        })?;

        Ok(self.client_for(mapping.store_id))
    }

    /// Returns the tenant's store id, if a store exists.
    pub async fn store_id(&self, tenant_id: TenantId) -> AppResult<Option<StoreId>> {
        Ok(self
            .stores
            .find(tenant_id)
            .await?
            .map(|mapping| mapping.store_id))
    }

    /// Creates the tenant's policy store, idempotently.
    ///
    /// Two concurrent calls for a never-before-seen tenant resolve through
    /// the mapping table's unique constraint: the loser deletes its
    /// freshly created engine store and returns the winner's store id, so
    /// exactly one store id is ever observed.
    pub async fn create_store(&self, tenant_id: TenantId) -> AppResult<StoreId> {
        if let Some(mapping) = self.stores.find(tenant_id).await? {
            return Ok(mapping.store_id);
        }

        let created = self
            .retry
            .run("evaluation engine store create", || {
                let engine = Arc::clone(&self.engine);
                let name = tenant_id.to_string();
                async move { engine.create_store(name.as_str()).await }
            })
            .await?;

        match self.stores.insert(tenant_id, &created).await? {
            TenantStoreInsert::Inserted => {
                info!(%tenant_id, store_id = %created, "provisioned tenant policy store");
                self.stage_event_best_effort(DomainEvent::TenantStoreProvisioned {
                    tenant_id,
                    store_id: created.to_string(),
                })
                .await;

                Ok(created)
            }
            TenantStoreInsert::AlreadyExists(existing) => {
                if let Err(error) = self.engine.delete_store(&created).await {
                    warn!(
                        %tenant_id,
                        store_id = %created,
                        error = %error,
                        "failed to remove store left over from lost provisioning race"
                    );
                }

                Ok(existing.store_id)
            }
        }
    }

    /// Writes the authorization model into the tenant's store and seeds
    /// the built-in roles.
    ///
    /// Safe to call repeatedly: the model is content-fingerprinted, so
    /// re-initialization with an unchanged model skips the engine write.
    pub async fn initialize_model(&self, tenant_id: TenantId) -> AppResult<()> {
        let store_id = self.create_store(tenant_id).await?;
        let mapping = self.stores.find(tenant_id).await?.ok_or_else(|| {
            AppError::StoreNotFound(format!(
                "no policy store exists for tenant '{tenant_id}'"
            ))
        })?;

        let model = authorization_model();
        let fingerprint = model_fingerprint(&model)?;

        if mapping.model_fingerprint.as_deref() != Some(fingerprint.as_str()) {
            let model_id = self
                .retry
                .run("evaluation engine model write", || {
                    let engine = Arc::clone(&self.engine);
                    let store_id = store_id.clone();
                    let model = model.clone();
                    async move {
                        engine
                            .write_authorization_model(&store_id, &model)
                            .await
                    }
                })
                .await?;

            self.stores
                .update_model_fingerprint(tenant_id, fingerprint.as_str())
                .await?;
            info!(%tenant_id, %store_id, model_id, "wrote tenant authorization model");
        }

        let seed = builtin_roles()?;
        self.roles.seed_builtin(tenant_id, seed.as_slice()).await?;

        Ok(())
    }

    /// Deletes the tenant's store irreversibly during offboarding.
    pub async fn delete_store(&self, tenant_id: TenantId) -> AppResult<()> {
        let mapping = self.stores.find(tenant_id).await?.ok_or_else(|| {
            AppError::StoreNotFound(format!(
                "no policy store exists for tenant '{tenant_id}'"
            ))
        })?;

        self.retry
            .run("evaluation engine store delete", || {
                let engine = Arc::clone(&self.engine);
                let store_id = mapping.store_id.clone();
                async move { engine.delete_store(&store_id).await }
            })
            .await?;

        self.stores.delete(tenant_id).await?;

        let prefix = cache_keys::tenant_prefix(tenant_id);
        if let Err(error) = self.cache.invalidate_prefix(prefix.as_str()).await {
            warn!(%tenant_id, error = %error, "failed to invalidate tenant cache after offboarding");
        }

        info!(%tenant_id, store_id = %mapping.store_id, "deleted tenant policy store");
        self.stage_event_best_effort(DomainEvent::TenantStoreDeleted {
            tenant_id,
            store_id: mapping.store_id.to_string(),
        })
        .await;

        Ok(())
    }

    fn client_for(&self, store_id: StoreId) -> TenantEvaluationClient {
        TenantEvaluationClient {
            store_id,
            engine: Arc::clone(&self.engine),
            retry: self.retry,
        }
    }

    async fn stage_event_best_effort(&self, event: DomainEvent) {
        if let Err(error) = self.outbox.enqueue(&event).await {
            warn!(
                event_type = event.event_type(),
                error = %error,
                "failed to stage store lifecycle event"
            );
        }
    }
}
