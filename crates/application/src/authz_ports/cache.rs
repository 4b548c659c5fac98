use async_trait::async_trait;
use gatewarden_core::AppResult;

/// Best-effort key-value cache port.
///
/// Adapter failures surface as [`gatewarden_core::AppError::CacheUnavailable`];
/// callers degrade to direct evaluation rather than failing the operation.
/// Prefix invalidation is O(matching keys); call sites prefer
/// [`AuthorizationCache::invalidate`] whenever the exact key is known.
#[async_trait]
pub trait AuthorizationCache: Send + Sync {
    /// Returns the cached value for an exact key, or `None` on miss.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Stores a value under a key with a ttl in seconds.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u32) -> AppResult<()>;

    /// Removes one exact key.
    async fn invalidate(&self, key: &str) -> AppResult<()>;

    /// Removes every key starting with the prefix.
    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<()>;

    /// Probes backing-store reachability for the health signal.
    async fn ping(&self) -> AppResult<()>;
}

/// Per-category cache ttl defaults in seconds.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtlConfig {
    /// Ttl for permission check results.
    pub permission_check_ttl_seconds: u32,
    /// Ttl for resolved principal projections.
    pub principal_ttl_seconds: u32,
    /// Ttl for role definitions.
    pub role_definition_ttl_seconds: u32,
    /// Ttl for per-scope role assignment lists.
    pub role_assignment_ttl_seconds: u32,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            permission_check_ttl_seconds: 300,
            principal_ttl_seconds: 600,
            role_definition_ttl_seconds: 3600,
            role_assignment_ttl_seconds: 300,
        }
    }
}
