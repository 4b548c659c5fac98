use std::sync::Arc;

use tracing::warn;

use crate::AuthorizationCache;

/// Reachability signal for the service health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// All probed dependencies are reachable.
    Healthy,
    /// The cache backing store is unreachable; checks degrade to direct
    /// evaluation but the service keeps answering.
    Degraded,
}

/// Health probe over best-effort dependencies.
#[derive(Clone)]
pub struct HealthService {
    cache: Arc<dyn AuthorizationCache>,
}

impl HealthService {
    /// Creates a health service probing the given cache.
    #[must_use]
    pub fn new(cache: Arc<dyn AuthorizationCache>) -> Self {
        Self { cache }
    }

    /// Probes cache reachability.
    ///
    /// A failed probe degrades the health signal; it never fails the
    /// service, matching the cache layer's best-effort policy.
    pub async fn cache_health(&self) -> HealthStatus {
        match self.cache.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(error) => {
                warn!(error = %error, "cache reachability probe failed");
                HealthStatus::Degraded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use gatewarden_core::{AppError, AppResult};

    use crate::AuthorizationCache;

    use super::{HealthService, HealthStatus};

    struct UnreachableCache;

    #[async_trait]
    impl AuthorizationCache for UnreachableCache {
        async fn get(&self, _key: &str) -> AppResult<Option<String>> {
            Err(AppError::CacheUnavailable("down".to_owned()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u32) -> AppResult<()> {
            Err(AppError::CacheUnavailable("down".to_owned()))
        }

        async fn invalidate(&self, _key: &str) -> AppResult<()> {
            Err(AppError::CacheUnavailable("down".to_owned()))
        }

        async fn invalidate_prefix(&self, _prefix: &str) -> AppResult<()> {
            Err(AppError::CacheUnavailable("down".to_owned()))
        }

        async fn ping(&self) -> AppResult<()> {
            Err(AppError::CacheUnavailable("down".to_owned()))
        }
    }

    #[tokio::test]
    async fn unreachable_cache_degrades_instead_of_failing() {
        let service = HealthService::new(Arc::new(UnreachableCache));
        assert_eq!(service.cache_health().await, HealthStatus::Degraded);
    }
}
