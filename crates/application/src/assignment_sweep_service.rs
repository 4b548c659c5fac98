//! Background expiration sweep for role assignments.

use std::sync::Arc;

use gatewarden_core::AppResult;
use tracing::{info, warn};

use crate::authz_ports::{AssignmentRepository, AuthorizationCache, Clock, RelationTuple};
use crate::cache_keys;
use crate::store_router_service::StoreRouterService;

/// Periodic sweep that physically removes expired role assignments.
///
/// Expiry is already enforced lazily at check time; the sweep reclaims
/// storage, removes the matching engine tuples, and stages
/// `assignment.expired` events. It runs independently of the resolver and
/// shares no in-process state with it.
#[derive(Clone)]
pub struct AssignmentSweepService {
    assignments: Arc<dyn AssignmentRepository>,
    router: StoreRouterService,
    cache: Arc<dyn AuthorizationCache>,
    clock: Arc<dyn Clock>,
}

impl AssignmentSweepService {
    /// Creates an expiration sweep service.
    #[must_use]
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        router: StoreRouterService,
        cache: Arc<dyn AuthorizationCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            assignments,
            router,
            cache,
            clock,
        }
    }

    /// Removes up to `limit` expired assignments and returns how many were
    /// swept.
    ///
    /// Row removal and event staging are atomic per batch; engine tuple
    /// and cache cleanup afterwards are best-effort, since the resolver
    /// already denies once the row is gone.
    pub async fn sweep_once(&self, limit: usize) -> AppResult<usize> {
        let now = self.clock.now();
        let swept = self
            .assignments
            .sweep_expired_with_events(now, limit)
            .await?;

        for assignment in &swept {
            let tuple = RelationTuple::role_at_scope(
                &assignment.principal,
                assignment.role_id.as_str(),
                &assignment.scope,
            );

            match self.router.client(assignment.tenant_id).await {
                Ok(client) => {
                    if let Err(error) = client.delete_tuple(&tuple).await {
                        warn!(
                            tenant_id = %assignment.tenant_id,
                            assignment_id = %assignment.id,
                            error = %error,
                            "failed to remove engine tuple for expired assignment"
                        );
                    }
                }
                Err(error) => {
                    warn!(
                        tenant_id = %assignment.tenant_id,
                        assignment_id = %assignment.id,
                        error = %error,
                        "no evaluation client available for expired assignment cleanup"
                    );
                }
            }

            let prefix =
                cache_keys::principal_prefix(assignment.tenant_id, &assignment.principal);
            if let Err(error) = self.cache.invalidate_prefix(prefix.as_str()).await {
                warn!(
                    tenant_id = %assignment.tenant_id,
                    principal = %assignment.principal,
                    error = %error,
                    "failed to invalidate cache entries for expired assignment"
                );
            }
        }

        if !swept.is_empty() {
            info!(count = swept.len(), "removed expired role assignments");
        }

        Ok(swept.len())
    }
}
