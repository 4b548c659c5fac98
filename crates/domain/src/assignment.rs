use chrono::{DateTime, Utc};
use gatewarden_core::{Scope, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PrincipalRef;

/// The binding of a role to a principal at a scope, optionally time-limited.
///
/// At most one active assignment exists per
/// `(tenant, principal, role, scope)` tuple; the persistence layer enforces
/// this with a unique index. Expiry is computed from `expires_at`, never
/// stored as a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Stable assignment identifier.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Principal holding the role.
    pub principal: PrincipalRef,
    /// Assigned role identifier.
    pub role_id: String,
    /// Scope the role applies at.
    pub scope: Scope,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Subject that created the assignment.
    pub created_by: String,
    /// Optional expiry timestamp.
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Returns whether the assignment is active at `now`.
    ///
    /// Expired assignments may still be physically present until a revoke
    /// or the expiration sweep removes them; callers must filter with this
    /// predicate rather than assume a sweep has run.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use gatewarden_core::{Scope, TenantId};
    use uuid::Uuid;

    use crate::{PrincipalRef, PrincipalType};

    use super::RoleAssignment;

    fn assignment(expires_at: Option<chrono::DateTime<Utc>>) -> RoleAssignment {
        let scope = match Scope::parse("org/a") {
            Ok(scope) => scope,
            Err(error) => panic!("failed to parse scope: {error}"),
        };

        RoleAssignment {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new(),
            principal: PrincipalRef::new(Uuid::new_v4(), PrincipalType::User),
            role_id: "viewer".to_owned(),
            scope,
            created_at: Utc::now(),
            created_by: "admin".to_owned(),
            expires_at,
        }
    }

    #[test]
    fn assignment_without_expiry_is_always_active() {
        let now = Utc::now();
        assert!(assignment(None).is_active(now));
    }

    #[test]
    fn expiry_is_computed_not_stored() {
        let now = Utc::now();
        assert!(assignment(Some(now + Duration::minutes(5))).is_active(now));
        assert!(!assignment(Some(now - Duration::minutes(5))).is_active(now));
        assert!(!assignment(Some(now)).is_active(now));
    }
}
