//! Permission resolution and role-assignment lifecycle.

mod assignments;
mod check;
mod roles;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatewarden_core::TenantId;
use gatewarden_domain::{
    DomainEvent, Permission, PrincipalRef, RoleDefinition, ScopePattern,
};
use tracing::warn;

use crate::authz_ports::{
    AssignmentRepository, AuthorizationCache, CacheTtlConfig, Clock, IdentityProvider,
    OutboxRepository, RoleRepository,
};
use crate::cache_keys;
use crate::store_router_service::StoreRouterService;

/// Input for one permission check.
#[derive(Debug, Clone)]
pub struct CheckPermissionInput {
    /// Permission to check.
    pub permission: Permission,
    /// Raw scope path the check is requested at.
    pub scope: String,
    /// Explicit principal; when absent, the caller's default principal is
    /// resolved through the identity provider.
    pub principal: Option<PrincipalRef>,
}

/// Input for creating a role assignment.
#[derive(Debug, Clone)]
pub struct CreateAssignmentInput {
    /// Principal receiving the role.
    pub principal: PrincipalRef,
    /// Role to assign.
    pub role_id: String,
    /// Raw scope path the role applies at.
    pub scope: String,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Optional free-text justification captured for audit.
    pub justification: Option<String>,
}

/// Input for creating a custom role.
#[derive(Debug, Clone)]
pub struct CreateRoleInput {
    /// Stable role identifier.
    pub role_id: String,
    /// Human-readable role name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Permissions granted by the role.
    pub permissions: std::collections::BTreeSet<Permission>,
    /// Scope patterns the role may be assigned at; empty means anywhere.
    pub assignable_scopes: Vec<ScopePattern>,
}

/// Application service answering permission checks and managing role
/// assignments for one deployment.
///
/// Checks are cache-first and walk the scope hierarchy most-specific
/// first; relationship evaluation is delegated to the tenant's policy
/// store through the store router.
#[derive(Clone)]
pub struct PermissionService {
    assignments: Arc<dyn AssignmentRepository>,
    roles: Arc<dyn RoleRepository>,
    cache: Arc<dyn AuthorizationCache>,
    outbox: Arc<dyn OutboxRepository>,
    identity: Arc<dyn IdentityProvider>,
    router: StoreRouterService,
    clock: Arc<dyn Clock>,
    ttl: CacheTtlConfig,
}

impl PermissionService {
    /// Creates a permission service.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        roles: Arc<dyn RoleRepository>,
        cache: Arc<dyn AuthorizationCache>,
        outbox: Arc<dyn OutboxRepository>,
        identity: Arc<dyn IdentityProvider>,
        router: StoreRouterService,
        clock: Arc<dyn Clock>,
        ttl: CacheTtlConfig,
    ) -> Self {
        Self {
            assignments,
            roles,
            cache,
            outbox,
            identity,
            router,
            clock,
            ttl,
        }
    }

    /// Reads one key from the cache, degrading to a miss on cache failure.
    async fn cache_get_best_effort(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(error) => {
                warn!(key, error = %error, "cache read failed, degrading to direct evaluation");
                None
            }
        }
    }

    /// Writes one key to the cache, swallowing cache failures.
    async fn cache_set_best_effort(&self, key: &str, value: &str, ttl_seconds: u32) {
        if let Err(error) = self.cache.set(key, value, ttl_seconds).await {
            warn!(key, error = %error, "cache write failed, result not cached");
        }
    }

    /// Drops every cached entry of one principal in one tenant.
    ///
    /// Invalidation is fire-and-forget relative to the triggering command:
    /// the command already succeeded durably, so a failed invalidation
    /// only delays convergence until the ttl expires.
    async fn invalidate_principal_cache_best_effort(
        &self,
        tenant_id: TenantId,
        principal: &PrincipalRef,
    ) {
        let prefix = cache_keys::principal_prefix(tenant_id, principal);
        if let Err(error) = self.cache.invalidate_prefix(prefix.as_str()).await {
            warn!(
                %tenant_id,
                principal = %principal,
                error = %error,
                "failed to invalidate principal cache entries"
            );
        }
    }

    /// Loads one role definition through the role-definition cache.
    async fn load_role_cached(
        &self,
        tenant_id: TenantId,
        role_id: &str,
    ) -> gatewarden_core::AppResult<Option<RoleDefinition>> {
        let key = cache_keys::role_definition_key(tenant_id, role_id);
        if let Some(encoded) = self.cache_get_best_effort(key.as_str()).await {
            match serde_json::from_str::<RoleDefinition>(encoded.as_str()) {
                Ok(role) => return Ok(Some(role)),
                Err(error) => {
                    warn!(key, error = %error, "discarding undecodable cached role definition");
                }
            }
        }

        let Some(role) = self.roles.find(tenant_id, role_id).await? else {
            return Ok(None);
        };

        if let Ok(encoded) = serde_json::to_string(&role) {
            self.cache_set_best_effort(
                key.as_str(),
                encoded.as_str(),
                self.ttl.role_definition_ttl_seconds,
            )
            .await;
        }

        Ok(Some(role))
    }

    /// Stages one event through the outbox, swallowing staging failures.
    ///
    /// Used only for telemetry events with no business transaction to
    /// join; staging failure is an observability loss, not a correctness
    /// one.
    async fn stage_event_best_effort(&self, event: DomainEvent) {
        if let Err(error) = self.outbox.enqueue(&event).await {
            warn!(
                event_type = event.event_type(),
                error = %error,
                "failed to stage telemetry event"
            );
        }
    }
}
