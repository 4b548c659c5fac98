use std::time::Instant;

use chrono::{DateTime, Utc};
use gatewarden_core::{AppResult, CallerIdentity, Scope, TenantId};
use gatewarden_domain::{
    DomainEvent, PermissionCheckResult, Principal, PrincipalRef, RoleAssignment,
};
use tracing::warn;

use crate::authz_ports::{AssignmentRepository, Clock, IdentityProvider, RelationTuple};
use crate::cache_keys;

use super::{CheckPermissionInput, PermissionService};

impl PermissionService {
    /// Resolves one permission check.
    ///
    /// Resolution is cache-first: a hit returns immediately without
    /// re-walking the scope hierarchy. On a miss the scope chain is walked
    /// from the requested scope up to the root, and the first grant
    /// confirmed by the evaluation engine at the most specific scope wins.
    /// Allow and deny outcomes are both cached so repeated denials stay
    /// cheap.
    ///
    /// Infrastructure failures surface as typed errors, never as a
    /// default allow or deny; the fail-open/fail-closed decision belongs
    /// to the calling edge.
    pub async fn check(
        &self,
        caller: &CallerIdentity,
        input: CheckPermissionInput,
    ) -> AppResult<PermissionCheckResult> {
        let started = Instant::now();
        let tenant_id = caller.tenant_id();
        let scope = Scope::parse(input.scope.as_str())?;

        let principal = match input.principal {
            Some(principal) => principal,
            None => self.resolve_caller_principal(caller).await?,
        };

        let check_key =
            cache_keys::permission_check_key(tenant_id, &principal, &input.permission, &scope);
        if let Some(encoded) = self.cache_get_best_effort(check_key.as_str()).await {
            match serde_json::from_str::<PermissionCheckResult>(encoded.as_str()) {
                Ok(mut cached) => {
                    cached.from_cache = true;
                    cached.duration_ms = duration_ms_since(started);
                    self.stage_check_event(tenant_id, &cached).await;
                    return Ok(cached);
                }
                Err(error) => {
                    warn!(
                        key = check_key.as_str(),
                        error = %error,
                        "discarding undecodable cached check result"
                    );
                }
            }
        }

        let client = self.router.client(tenant_id).await?;
        let now = self.clock.now();

        let mut grant: Option<(String, Scope)> = None;
        'walk: for level in scope.self_and_ancestors() {
            let candidates = self
                .assignments_at_scope_cached(tenant_id, &principal, &level, now)
                .await?;

            for assignment in candidates {
                // Lazy expiration: a cached assignment list may still hold
                // rows that expired since it was written.
                if !assignment.is_active(now) {
                    continue;
                }

                let Some(role) = self
                    .load_role_cached(tenant_id, assignment.role_id.as_str())
                    .await?
                else {
                    warn!(
                        %tenant_id,
                        role_id = assignment.role_id.as_str(),
                        "assignment references a role that no longer exists"
                    );
                    continue;
                };

                if !role.grants(&input.permission) {
                    continue;
                }

                let tuple =
                    RelationTuple::role_at_scope(&principal, assignment.role_id.as_str(), &level);
                if client.check(&tuple).await? {
                    grant = Some((assignment.role_id, level.clone()));
                    break 'walk;
                }
            }
        }

        let mut result = match grant {
            Some((role_id, granting_scope)) => PermissionCheckResult::granted(
                principal,
                input.permission.clone(),
                scope.clone(),
                role_id,
                granting_scope,
            ),
            None => PermissionCheckResult::denied(principal, input.permission.clone(), scope),
        };
        result.duration_ms = duration_ms_since(started);

        // The result is fully computed before the cache write, so a check
        // cancelled mid-walk never leaves a partial cache entry.
        if let Ok(encoded) = serde_json::to_string(&result) {
            self.cache_set_best_effort(
                check_key.as_str(),
                encoded.as_str(),
                self.ttl.permission_check_ttl_seconds,
            )
            .await;
        }

        self.stage_check_event(tenant_id, &result).await;

        Ok(result)
    }

    async fn resolve_caller_principal(
        &self,
        caller: &CallerIdentity,
    ) -> AppResult<PrincipalRef> {
        let tenant_id = caller.tenant_id();
        let key = cache_keys::principal_info_key(tenant_id, caller.subject());

        if let Some(encoded) = self.cache_get_best_effort(key.as_str()).await {
            match serde_json::from_str::<Principal>(encoded.as_str()) {
                Ok(principal) => return Ok(principal.to_ref()),
                Err(error) => {
                    warn!(key = key.as_str(), error = %error, "discarding undecodable cached principal");
                }
            }
        }

        let principal = self.identity.resolve_principal(caller).await?;
        if let Ok(encoded) = serde_json::to_string(&principal) {
            self.cache_set_best_effort(
                key.as_str(),
                encoded.as_str(),
                self.ttl.principal_ttl_seconds,
            )
            .await;
        }

        Ok(principal.to_ref())
    }

    async fn assignments_at_scope_cached(
        &self,
        tenant_id: TenantId,
        principal: &PrincipalRef,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let key = cache_keys::assignment_list_key(tenant_id, principal, scope);
        if let Some(encoded) = self.cache_get_best_effort(key.as_str()).await {
            match serde_json::from_str::<Vec<RoleAssignment>>(encoded.as_str()) {
                Ok(assignments) => return Ok(assignments),
                Err(error) => {
                    warn!(key = key.as_str(), error = %error, "discarding undecodable cached assignment list");
                }
            }
        }

        let assignments = self
            .assignments
            .list_active_for_principal_at_scope(tenant_id, principal, scope, now)
            .await?;

        if let Ok(encoded) = serde_json::to_string(&assignments) {
            self.cache_set_best_effort(
                key.as_str(),
                encoded.as_str(),
                self.ttl.role_assignment_ttl_seconds,
            )
            .await;
        }

        Ok(assignments)
    }

    async fn stage_check_event(&self, tenant_id: TenantId, result: &PermissionCheckResult) {
        self.stage_event_best_effort(DomainEvent::PermissionChecked {
            tenant_id,
            principal_id: result.principal.principal_id,
            principal_type: result.principal.principal_type,
            permission: result.permission.clone(),
            scope: result.scope.clone(),
            allowed: result.allowed,
            from_cache: result.from_cache,
            duration_ms: result.duration_ms,
        })
        .await;
    }
}

fn duration_ms_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}
