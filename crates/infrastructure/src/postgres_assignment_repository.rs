use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatewarden_application::AssignmentRepository;
use gatewarden_core::{AppError, AppResult, Scope, TenantId};
use gatewarden_domain::{DomainEvent, PrincipalRef, PrincipalType, RoleAssignment};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// PostgreSQL-backed role assignment repository.
#[derive(Clone)]
pub struct PostgresAssignmentRepository {
    pool: PgPool,
}

impl PostgresAssignmentRepository {
    /// Creates an assignment repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleAssignmentRow {
    id: Uuid,
    tenant_id: Uuid,
    principal_id: Uuid,
    principal_type: String,
    role_id: String,
    scope: String,
    created_at: DateTime<Utc>,
    created_by: String,
    expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    async fn create_with_event(
        &self,
        assignment: &RoleAssignment,
        event: &DomainEvent,
    ) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to begin assignment create transaction: {error}"
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO role_assignments (
                id,
                tenant_id,
                principal_id,
                principal_type,
                role_id,
                scope,
                created_at,
                created_by,
                expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.tenant_id.as_uuid())
        .bind(assignment.principal.principal_id)
        .bind(assignment.principal.principal_type.as_str())
        .bind(assignment.role_id.as_str())
        .bind(assignment.scope.as_str())
        .bind(assignment.created_at)
        .bind(assignment.created_by.as_str())
        .bind(assignment.expires_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            if error
                .as_database_error()
                .is_some_and(|database_error| database_error.is_unique_violation())
            {
                AppError::Conflict(format!(
                    "an assignment for principal '{}' role '{}' at scope '{}' already exists",
                    assignment.principal, assignment.role_id, assignment.scope
                ))
            } else {
                AppError::Internal(format!(
                    "failed to insert assignment '{}' for tenant '{}': {error}",
                    assignment.id, assignment.tenant_id
                ))
            }
        })?;

        stage_outbox_message(&mut transaction, event).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit assignment create transaction: {error}"
            ))
        })
    }

    async fn find(
        &self,
        tenant_id: TenantId,
        assignment_id: Uuid,
    ) -> AppResult<Option<RoleAssignment>> {
        let row = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT
                id,
                tenant_id,
                principal_id,
                principal_type,
                role_id,
                scope,
                created_at,
                created_by,
                expires_at
            FROM role_assignments
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find assignment '{assignment_id}' for tenant '{tenant_id}': {error}"
            ))
        })?;

        row.map(role_assignment_from_row).transpose()
    }

    async fn delete_with_event(
        &self,
        tenant_id: TenantId,
        assignment_id: Uuid,
        event: &DomainEvent,
    ) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to begin assignment delete transaction: {error}"
            ))
        })?;

        let result = sqlx::query(
            r#"
            DELETE FROM role_assignments
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(assignment_id)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete assignment '{assignment_id}' for tenant '{tenant_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "assignment '{assignment_id}' does not exist in tenant '{tenant_id}'"
            )));
        }

        stage_outbox_message(&mut transaction, event).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit assignment delete transaction: {error}"
            ))
        })
    }

    async fn list_active_for_principal_at_scope(
        &self,
        tenant_id: TenantId,
        principal: &PrincipalRef,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT
                id,
                tenant_id,
                principal_id,
                principal_type,
                role_id,
                scope,
                created_at,
                created_by,
                expires_at
            FROM role_assignments
            WHERE tenant_id = $1
              AND principal_id = $2
              AND principal_type = $3
              AND scope = $4
              AND (expires_at IS NULL OR expires_at > $5)
            ORDER BY role_id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(principal.principal_id)
        .bind(principal.principal_type.as_str())
        .bind(scope.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list assignments for principal '{principal}' in tenant '{tenant_id}': {error}"
            ))
        })?;

        rows.into_iter().map(role_assignment_from_row).collect()
    }

    async fn sweep_expired_with_events(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to begin expiration sweep transaction: {error}"
            ))
        })?;

        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            DELETE FROM role_assignments
            WHERE id IN (
                SELECT id
                FROM role_assignments
                WHERE expires_at IS NOT NULL AND expires_at <= $1
                ORDER BY expires_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING
                id,
                tenant_id,
                principal_id,
                principal_type,
                role_id,
                scope,
                created_at,
                created_by,
                expires_at
            "#,
        )
        .bind(now)
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid expiration sweep limit: {error}"))
        })?)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to sweep expired assignments: {error}"))
        })?;

        let swept: Vec<RoleAssignment> = rows
            .into_iter()
            .map(role_assignment_from_row)
            .collect::<AppResult<_>>()?;

        for assignment in &swept {
            let event = DomainEvent::AssignmentExpired {
                tenant_id: assignment.tenant_id,
                assignment_id: assignment.id,
                principal_id: assignment.principal.principal_id,
                principal_type: assignment.principal.principal_type,
                role_id: assignment.role_id.clone(),
                scope: assignment.scope.clone(),
                expired_at: assignment.expires_at.unwrap_or(now),
            };
            stage_outbox_message(&mut transaction, &event).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit expiration sweep transaction: {error}"
            ))
        })?;

        Ok(swept)
    }
}

/// Inserts one outbox row inside the caller's transaction, so the event is
/// recorded iff the business change commits.
async fn stage_outbox_message(
    transaction: &mut Transaction<'_, Postgres>,
    event: &DomainEvent,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox_messages (id, event_type, payload, status, retry_count, created_at)
        VALUES ($1, $2, $3, 'pending', 0, now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(event.event_type())
    .bind(event.to_payload()?)
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to stage '{}' outbox message: {error}",
            event.event_type()
        ))
    })?;

    Ok(())
}

fn role_assignment_from_row(row: RoleAssignmentRow) -> AppResult<RoleAssignment> {
    Ok(RoleAssignment {
        id: row.id,
        tenant_id: TenantId::from_uuid(row.tenant_id),
        principal: PrincipalRef::new(
            row.principal_id,
            PrincipalType::parse(row.principal_type.as_str())?,
        ),
        role_id: row.role_id,
        scope: Scope::parse(row.scope.as_str())?,
        created_at: row.created_at,
        created_by: row.created_by,
        expires_at: row.expires_at,
    })
}
