use gatewarden_core::{AppResult, CallerIdentity};
use gatewarden_domain::{NewRoleDefinition, RoleDefinition};
use tracing::warn;

use crate::authz_ports::{AuthorizationCache, RoleRepository};
use crate::cache_keys;

use super::{CreateRoleInput, PermissionService};

impl PermissionService {
    /// Creates a tenant-scoped custom role.
    ///
    /// Built-in role identifiers are reserved; attempting to redefine one
    /// fails with `Conflict` from the repository's uniqueness check.
    pub async fn create_custom_role(
        &self,
        caller: &CallerIdentity,
        input: CreateRoleInput,
    ) -> AppResult<RoleDefinition> {
        let tenant_id = caller.tenant_id();
        let role = RoleDefinition::new(NewRoleDefinition {
            role_id: input.role_id,
            name: input.name,
            description: input.description,
            is_built_in: false,
            permissions: input.permissions,
            assignable_scopes: input.assignable_scopes,
        })?;

        self.roles.create_custom(tenant_id, &role).await?;

        let key = cache_keys::role_definition_key(tenant_id, role.role_id());
        if let Err(error) = self.cache.invalidate(key.as_str()).await {
            warn!(key = key.as_str(), error = %error, "failed to invalidate role definition cache");
        }

        Ok(role)
    }

    /// Returns one role definition through the role-definition cache.
    pub async fn role(
        &self,
        caller: &CallerIdentity,
        role_id: &str,
    ) -> AppResult<Option<RoleDefinition>> {
        self.load_role_cached(caller.tenant_id(), role_id).await
    }

    /// Lists all role definitions for the caller's tenant.
    pub async fn list_roles(&self, caller: &CallerIdentity) -> AppResult<Vec<RoleDefinition>> {
        self.roles.list(caller.tenant_id()).await
    }
}
