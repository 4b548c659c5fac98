use gatewarden_core::Scope;
use serde::{Deserialize, Serialize};

use crate::{Permission, PrincipalRef};

/// Outcome of one permission check.
///
/// Ephemeral: produced per request and optionally cached, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionCheckResult {
    /// Whether the permission is granted.
    pub allowed: bool,
    /// Principal the check was evaluated for.
    pub principal: PrincipalRef,
    /// Permission that was checked.
    pub permission: Permission,
    /// Scope the check was requested at.
    pub scope: Scope,
    /// Role that granted the permission, when allowed.
    pub granting_role: Option<String>,
    /// Scope the granting assignment applies at, when allowed.
    pub granting_scope: Option<Scope>,
    /// Whether the result was served from cache.
    pub from_cache: bool,
    /// Wall-clock resolution time in milliseconds, exclusive of event
    /// emission.
    pub duration_ms: f64,
}

impl PermissionCheckResult {
    /// Returns a denial result with no granting role.
    #[must_use]
    pub fn denied(principal: PrincipalRef, permission: Permission, scope: Scope) -> Self {
        Self {
            allowed: false,
            principal,
            permission,
            scope,
            granting_role: None,
            granting_scope: None,
            from_cache: false,
            duration_ms: 0.0,
        }
    }

    /// Returns a grant result naming the granting role and scope.
    #[must_use]
    pub fn granted(
        principal: PrincipalRef,
        permission: Permission,
        scope: Scope,
        granting_role: String,
        granting_scope: Scope,
    ) -> Self {
        Self {
            allowed: true,
            principal,
            permission,
            scope,
            granting_role: Some(granting_role),
            granting_scope: Some(granting_scope),
            from_cache: false,
            duration_ms: 0.0,
        }
    }
}
