use async_trait::async_trait;
use gatewarden_application::RoleRepository;
use gatewarden_core::{AppError, AppResult, TenantId};
use gatewarden_domain::{NewRoleDefinition, Permission, RoleDefinition, ScopePattern};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed role definition repository.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a role repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleDefinitionRow {
    role_id: String,
    name: String,
    description: Option<String>,
    is_built_in: bool,
    permissions: Value,
    assignable_scopes: Value,
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn find(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<RoleDefinition>> {
        let row = sqlx::query_as::<_, RoleDefinitionRow>(
            r#"
            SELECT role_id, name, description, is_built_in, permissions, assignable_scopes
            FROM role_definitions
            WHERE tenant_id = $1 AND role_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find role '{role_id}' for tenant '{tenant_id}': {error}"
            ))
        })?;

        row.map(role_definition_from_row).transpose()
    }

    async fn list(&self, tenant_id: TenantId) -> AppResult<Vec<RoleDefinition>> {
        let rows = sqlx::query_as::<_, RoleDefinitionRow>(
            r#"
            SELECT role_id, name, description, is_built_in, permissions, assignable_scopes
            FROM role_definitions
            WHERE tenant_id = $1
            ORDER BY role_id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list roles for tenant '{tenant_id}': {error}"
            ))
        })?;

        rows.into_iter().map(role_definition_from_row).collect()
    }

    async fn seed_builtin(&self, tenant_id: TenantId, roles: &[RoleDefinition]) -> AppResult<()> {
        for role in roles {
            sqlx::query(
                r#"
                INSERT INTO role_definitions (
                    tenant_id,
                    role_id,
                    name,
                    description,
                    is_built_in,
                    permissions,
                    assignable_scopes,
                    updated_at
                )
                VALUES ($1, $2, $3, $4, true, $5, $6, now())
                ON CONFLICT (tenant_id, role_id)
                DO UPDATE SET
                    name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    permissions = EXCLUDED.permissions,
                    assignable_scopes = EXCLUDED.assignable_scopes,
                    updated_at = now()
                WHERE role_definitions.is_built_in = true
                "#,
            )
            .bind(tenant_id.as_uuid())
            .bind(role.role_id())
            .bind(role.name())
            .bind(role.description())
            .bind(permissions_to_json(role)?)
            .bind(assignable_scopes_to_json(role))
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to seed built-in role '{}' for tenant '{tenant_id}': {error}",
                    role.role_id()
                ))
            })?;
        }

        Ok(())
    }

    async fn create_custom(&self, tenant_id: TenantId, role: &RoleDefinition) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_definitions (
                tenant_id,
                role_id,
                name,
                description,
                is_built_in,
                permissions,
                assignable_scopes,
                updated_at
            )
            VALUES ($1, $2, $3, $4, false, $5, $6, now())
            ON CONFLICT (tenant_id, role_id) DO NOTHING
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role.role_id())
        .bind(role.name())
        .bind(role.description())
        .bind(permissions_to_json(role)?)
        .bind(assignable_scopes_to_json(role))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to create role '{}' for tenant '{tenant_id}': {error}",
                role.role_id()
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists in tenant '{tenant_id}'",
                role.role_id()
            )));
        }

        Ok(())
    }
}

fn permissions_to_json(role: &RoleDefinition) -> AppResult<Value> {
    serde_json::to_value(role.permissions()).map_err(|error| {
        AppError::Internal(format!(
            "failed to serialize permissions for role '{}': {error}",
            role.role_id()
        ))
    })
}

fn assignable_scopes_to_json(role: &RoleDefinition) -> Value {
    Value::Array(
        role.assignable_scopes()
            .iter()
            .map(|pattern| Value::String(pattern.as_str().to_owned()))
            .collect(),
    )
}

fn role_definition_from_row(row: RoleDefinitionRow) -> AppResult<RoleDefinition> {
    let permissions: std::collections::BTreeSet<Permission> =
        serde_json::from_value(row.permissions).map_err(|error| {
            AppError::Internal(format!(
                "invalid stored permissions for role '{}': {error}",
                row.role_id
            ))
        })?;

    let assignable_scopes: Vec<ScopePattern> = serde_json::from_value(row.assignable_scopes)
        .map_err(|error| {
            AppError::Internal(format!(
                "invalid stored assignable_scopes for role '{}': {error}",
                row.role_id
            ))
        })?;

    RoleDefinition::new(NewRoleDefinition {
        role_id: row.role_id,
        name: row.name,
        description: row.description,
        is_built_in: row.is_built_in,
        permissions,
        assignable_scopes,
    })
}
