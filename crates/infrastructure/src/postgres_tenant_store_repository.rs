use async_trait::async_trait;
use gatewarden_application::{StoreId, TenantStoreInsert, TenantStoreMapping, TenantStoreRepository};
use gatewarden_core::{AppError, AppResult, TenantId};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL-backed tenant-to-store mapping.
///
/// The unique constraint on `tenant_id` is what makes concurrent store
/// provisioning safe: the losing insert observes zero affected rows and
/// fetches the winner's mapping instead.
#[derive(Clone)]
pub struct PostgresTenantStoreRepository {
    pool: PgPool,
}

impl PostgresTenantStoreRepository {
    /// Creates a tenant-store repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TenantStoreRow {
    tenant_id: Uuid,
    store_id: String,
    model_fingerprint: Option<String>,
}

#[async_trait]
impl TenantStoreRepository for PostgresTenantStoreRepository {
    async fn find(&self, tenant_id: TenantId) -> AppResult<Option<TenantStoreMapping>> {
        let row = sqlx::query_as::<_, TenantStoreRow>(
            r#"
            SELECT tenant_id, store_id, model_fingerprint
            FROM tenant_policy_stores
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find policy store mapping for tenant '{tenant_id}': {error}"
            ))
        })?;

        Ok(row.map(mapping_from_row))
    }

    async fn insert(
        &self,
        tenant_id: TenantId,
        store_id: &StoreId,
    ) -> AppResult<TenantStoreInsert> {
        let result = sqlx::query(
            r#"
            INSERT INTO tenant_policy_stores (tenant_id, store_id, created_at)
            VALUES ($1, $2, now())
            ON CONFLICT (tenant_id) DO NOTHING
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(store_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to insert policy store mapping for tenant '{tenant_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 1 {
            return Ok(TenantStoreInsert::Inserted);
        }

        let existing = self.find(tenant_id).await?.ok_or_else(|| {
            AppError::Internal(format!(
                "policy store mapping for tenant '{tenant_id}' vanished during provisioning"
            ))
        })?;

        Ok(TenantStoreInsert::AlreadyExists(existing))
    }

    async fn update_model_fingerprint(
        &self,
        tenant_id: TenantId,
        fingerprint: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_policy_stores
            SET model_fingerprint = $2
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(fingerprint)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update model fingerprint for tenant '{tenant_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "no policy store mapping exists for tenant '{tenant_id}'"
            )));
        }

        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM tenant_policy_stores
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete policy store mapping for tenant '{tenant_id}': {error}"
            ))
        })?;

        Ok(())
    }
}

fn mapping_from_row(row: TenantStoreRow) -> TenantStoreMapping {
    TenantStoreMapping {
        tenant_id: TenantId::from_uuid(row.tenant_id),
        store_id: StoreId::new(row.store_id),
        model_fingerprint: row.model_fingerprint,
    }
}
