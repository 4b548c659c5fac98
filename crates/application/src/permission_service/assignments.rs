use gatewarden_core::{AppError, AppResult, CallerIdentity, Scope};
use gatewarden_domain::{DomainEvent, RoleAssignment};
use tracing::warn;
use uuid::Uuid;

use crate::authz_ports::{AssignmentRepository, Clock, RelationTuple};

use super::{CreateAssignmentInput, PermissionService};

impl PermissionService {
    /// Creates a role assignment.
    ///
    /// The engine tuple is written before the durable insert: the resolver
    /// requires both the assignment row and a confirmed tuple, so an
    /// orphaned tuple left by a failed insert cannot grant anything, while
    /// the reverse order could leave a committed assignment that the
    /// engine denies. The assignment row and its `assignment.created`
    /// outbox message commit in one transaction.
    pub async fn create_assignment(
        &self,
        caller: &CallerIdentity,
        input: CreateAssignmentInput,
    ) -> AppResult<RoleAssignment> {
        let tenant_id = caller.tenant_id();
        let scope = Scope::parse(input.scope.as_str())?;
        let now = self.clock.now();

        if let Some(expires_at) = input.expires_at
            && expires_at <= now
        {
            return Err(AppError::Validation(format!(
                "expires_at '{expires_at}' must be in the future"
            )));
        }

        let role = self
            .load_role_cached(tenant_id, input.role_id.as_str())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "role '{}' does not exist in tenant '{tenant_id}'",
                    input.role_id
                ))
            })?;

        if !role.is_assignable_at(&scope) {
            return Err(AppError::Validation(format!(
                "role '{}' is not assignable at scope '{scope}'",
                role.role_id()
            )));
        }

        let assignment = RoleAssignment {
            id: Uuid::new_v4(),
            tenant_id,
            principal: input.principal,
            role_id: input.role_id,
            scope: scope.clone(),
            created_at: now,
            created_by: caller.subject().to_owned(),
            expires_at: input.expires_at,
        };

        let client = self.router.client(tenant_id).await?;
        let tuple =
            RelationTuple::role_at_scope(&assignment.principal, assignment.role_id.as_str(), &scope);
        client.write_tuple(&tuple).await?;

        let event = DomainEvent::AssignmentCreated {
            tenant_id,
            assignment_id: assignment.id,
            principal_id: assignment.principal.principal_id,
            principal_type: assignment.principal.principal_type,
            role_id: assignment.role_id.clone(),
            scope: scope.clone(),
            expires_at: assignment.expires_at,
            created_by: assignment.created_by.clone(),
            justification: input.justification,
        };

        if let Err(error) = self.assignments.create_with_event(&assignment, &event).await {
            // On a uniqueness conflict the tuple is the same one the
            // existing assignment relies on, so it must stay.
            if !matches!(error, AppError::Conflict(_)) {
                if let Err(cleanup_error) = client.delete_tuple(&tuple).await {
                    warn!(
                        %tenant_id,
                        assignment_id = %assignment.id,
                        error = %cleanup_error,
                        "failed to remove engine tuple after assignment insert failure"
                    );
                }
            }
            return Err(error);
        }

        self.invalidate_principal_cache_best_effort(tenant_id, &assignment.principal)
            .await;

        Ok(assignment)
    }

    /// Revokes a role assignment.
    ///
    /// The durable delete commits first; the resolver denies as soon as
    /// the row is gone, so the engine tuple cleanup afterwards is
    /// best-effort.
    pub async fn revoke_assignment(
        &self,
        caller: &CallerIdentity,
        assignment_id: Uuid,
    ) -> AppResult<()> {
        let tenant_id = caller.tenant_id();
        let assignment = self
            .assignments
            .find(tenant_id, assignment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "assignment '{assignment_id}' does not exist in tenant '{tenant_id}'"
                ))
            })?;

        let event = DomainEvent::AssignmentRevoked {
            tenant_id,
            assignment_id,
            principal_id: assignment.principal.principal_id,
            principal_type: assignment.principal.principal_type,
            role_id: assignment.role_id.clone(),
            scope: assignment.scope.clone(),
            revoked_by: caller.subject().to_owned(),
        };

        self.assignments
            .delete_with_event(tenant_id, assignment_id, &event)
            .await?;

        self.cleanup_assignment_tuple(&assignment).await;
        self.invalidate_principal_cache_best_effort(tenant_id, &assignment.principal)
            .await;

        Ok(())
    }

    pub(super) async fn cleanup_assignment_tuple(&self, assignment: &RoleAssignment) {
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
                        "failed to remove engine tuple for removed assignment"
                    );
                }
            }
            Err(error) => {
                warn!(
                    tenant_id = %assignment.tenant_id,
                    assignment_id = %assignment.id,
                    error = %error,
                    "no evaluation client available for tuple cleanup"
                );
            }
        }
    }
}
