use chrono::{DateTime, Utc};
use gatewarden_core::{AppError, AppResult, Scope, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Permission, PrincipalType};

/// Domain events staged through the outbox for downstream consumers.
///
/// Delivery is at-least-once with no cross-message ordering; consumers
/// must deduplicate on the outbox message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Emitted after every permission check, allow or deny.
    PermissionChecked {
        /// Tenant the check ran in.
        tenant_id: TenantId,
        /// Principal the check was evaluated for.
        principal_id: Uuid,
        /// Principal kind tag.
        principal_type: PrincipalType,
        /// Permission that was checked.
        permission: Permission,
        /// Scope the check was requested at.
        scope: Scope,
        /// Check outcome.
        allowed: bool,
        /// Whether the result came from cache.
        from_cache: bool,
        /// Resolution time in milliseconds.
        duration_ms: f64,
    },
    /// Emitted when a role assignment is created.
    AssignmentCreated {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Created assignment identifier.
        assignment_id: Uuid,
        /// Principal receiving the role.
        principal_id: Uuid,
        /// Principal kind tag.
        principal_type: PrincipalType,
        /// Assigned role.
        role_id: String,
        /// Assignment scope.
        scope: Scope,
        /// Optional expiry.
        expires_at: Option<DateTime<Utc>>,
        /// Subject that created the assignment.
        created_by: String,
        /// Optional free-text justification captured for audit.
        justification: Option<String>,
    },
    /// Emitted when a role assignment is explicitly revoked.
    AssignmentRevoked {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Revoked assignment identifier.
        assignment_id: Uuid,
        /// Principal that held the role.
        principal_id: Uuid,
        /// Principal kind tag.
        principal_type: PrincipalType,
        /// Revoked role.
        role_id: String,
        /// Assignment scope.
        scope: Scope,
        /// Subject that revoked the assignment.
        revoked_by: String,
    },
    /// Emitted when the expiration sweep removes an expired assignment.
    AssignmentExpired {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Removed assignment identifier.
        assignment_id: Uuid,
        /// Principal that held the role.
        principal_id: Uuid,
        /// Principal kind tag.
        principal_type: PrincipalType,
        /// Expired role.
        role_id: String,
        /// Assignment scope.
        scope: Scope,
        /// Expiry timestamp that triggered removal.
        expired_at: DateTime<Utc>,
    },
    /// Emitted after a tenant policy store is provisioned.
    TenantStoreProvisioned {
        /// Provisioned tenant.
        tenant_id: TenantId,
        /// Store identifier in the evaluation engine.
        store_id: String,
    },
    /// Emitted after a tenant policy store is deleted during offboarding.
    TenantStoreDeleted {
        /// Offboarded tenant.
        tenant_id: TenantId,
        /// Deleted store identifier.
        store_id: String,
    },
}

impl DomainEvent {
    /// Returns a stable event type tag for routing and storage.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PermissionChecked { .. } => "permission.checked",
            Self::AssignmentCreated { .. } => "assignment.created",
            Self::AssignmentRevoked { .. } => "assignment.revoked",
            Self::AssignmentExpired { .. } => "assignment.expired",
            Self::TenantStoreProvisioned { .. } => "tenant_store.provisioned",
            Self::TenantStoreDeleted { .. } => "tenant_store.deleted",
        }
    }

    /// Returns the tenant the event belongs to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::PermissionChecked { tenant_id, .. }
            | Self::AssignmentCreated { tenant_id, .. }
            | Self::AssignmentRevoked { tenant_id, .. }
            | Self::AssignmentExpired { tenant_id, .. }
            | Self::TenantStoreProvisioned { tenant_id, .. }
            | Self::TenantStoreDeleted { tenant_id, .. } => *tenant_id,
        }
    }

    /// Serializes the event into an outbox payload.
    pub fn to_payload(&self) -> AppResult<Value> {
        serde_json::to_value(self).map_err(|error| {
            AppError::Internal(format!(
                "failed to serialize '{}' event payload: {error}",
                self.event_type()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use gatewarden_core::TenantId;

    use super::DomainEvent;

    #[test]
    fn payload_carries_type_tag() {
        let event = DomainEvent::TenantStoreProvisioned {
            tenant_id: TenantId::new(),
            store_id: "store-1".to_owned(),
        };

        let payload = event.to_payload();
        assert!(payload.is_ok());
        if let Ok(payload) = payload {
            assert_eq!(
                payload.get("type").and_then(serde_json::Value::as_str),
                Some("tenant_store_provisioned")
            );
        }
    }
}
