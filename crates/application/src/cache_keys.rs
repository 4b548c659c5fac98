//! Cache key composition.
//!
//! Every key starts with the owning tenant id, so cross-tenant cache
//! leakage is prevented by construction rather than by runtime checks.

use gatewarden_core::{Scope, TenantId};
use gatewarden_domain::{Permission, PrincipalRef};

const KEY_ROOT: &str = "authz";

/// Returns the prefix covering every cache entry of one tenant.
#[must_use]
pub fn tenant_prefix(tenant_id: TenantId) -> String {
    format!("{KEY_ROOT}:{tenant_id}:")
}

/// Returns the prefix covering every cache entry of one principal in one
/// tenant (check results and assignment lists).
#[must_use]
pub fn principal_prefix(tenant_id: TenantId, principal: &PrincipalRef) -> String {
    format!("{KEY_ROOT}:{tenant_id}:p:{principal}:")
}

/// Returns the key for one cached permission check result.
#[must_use]
pub fn permission_check_key(
    tenant_id: TenantId,
    principal: &PrincipalRef,
    permission: &Permission,
    scope: &Scope,
) -> String {
    format!("{KEY_ROOT}:{tenant_id}:p:{principal}:check:{permission}:{scope}")
}

/// Returns the key for one cached per-scope assignment list.
#[must_use]
pub fn assignment_list_key(
    tenant_id: TenantId,
    principal: &PrincipalRef,
    scope: &Scope,
) -> String {
    format!("{KEY_ROOT}:{tenant_id}:p:{principal}:assignments:{scope}")
}

/// Returns the key for one cached role definition.
#[must_use]
pub fn role_definition_key(tenant_id: TenantId, role_id: &str) -> String {
    format!("{KEY_ROOT}:{tenant_id}:role:{role_id}")
}

/// Returns the key for one cached principal projection.
#[must_use]
pub fn principal_info_key(tenant_id: TenantId, subject: &str) -> String {
    format!("{KEY_ROOT}:{tenant_id}:principal:{subject}")
}

#[cfg(test)]
mod tests {
    use gatewarden_core::{Scope, TenantId};
    use gatewarden_domain::{Permission, PrincipalRef, PrincipalType};
    use uuid::Uuid;

    use super::{
        assignment_list_key, permission_check_key, principal_info_key, principal_prefix,
        role_definition_key, tenant_prefix,
    };

    #[test]
    fn every_key_is_tenant_namespaced() {
        let tenant_id = TenantId::new();
        let other_tenant = TenantId::new();
        let principal = PrincipalRef::new(Uuid::new_v4(), PrincipalType::User);
        let permission = match Permission::parse("prompts:read") {
            Ok(permission) => permission,
            Err(error) => panic!("failed to parse permission: {error}"),
        };
        let scope = match Scope::parse("org/a") {
            Ok(scope) => scope,
            Err(error) => panic!("failed to parse scope: {error}"),
        };

        let prefix = tenant_prefix(tenant_id);
        let keys = [
            permission_check_key(tenant_id, &principal, &permission, &scope),
            assignment_list_key(tenant_id, &principal, &scope),
            role_definition_key(tenant_id, "owner"),
            principal_info_key(tenant_id, "alice"),
        ];

        for key in &keys {
            assert!(key.starts_with(prefix.as_str()), "key '{key}' escapes tenant namespace");
            assert!(!key.starts_with(tenant_prefix(other_tenant).as_str()));
        }
    }

    #[test]
    fn principal_prefix_covers_checks_and_assignments() {
        let tenant_id = TenantId::new();
        let principal = PrincipalRef::new(Uuid::new_v4(), PrincipalType::Group);
        let permission = match Permission::parse("prompts:write") {
            Ok(permission) => permission,
            Err(error) => panic!("failed to parse permission: {error}"),
        };
        let scope = match Scope::parse("org/a/tenant/b") {
            Ok(scope) => scope,
            Err(error) => panic!("failed to parse scope: {error}"),
        };

        let prefix = principal_prefix(tenant_id, &principal);
        assert!(
            permission_check_key(tenant_id, &principal, &permission, &scope)
                .starts_with(prefix.as_str())
        );
        assert!(assignment_list_key(tenant_id, &principal, &scope).starts_with(prefix.as_str()));
        assert!(!role_definition_key(tenant_id, "owner").starts_with(prefix.as_str()));
    }
}
