use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gatewarden_application::AuthorizationCache;
use gatewarden_core::AppResult;
use tokio::sync::Mutex;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local authorization cache.
///
/// Used by tests and by deployments that run without a shared cache;
/// entries expire by wall-clock ttl like the Redis adapter's.
#[derive(Default)]
pub struct InMemoryAuthorizationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryAuthorizationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationCache for InMemoryAuthorizationCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        self.entries.lock().await.insert(
            key.to_owned(),
            CacheEntry {
                value: value.to_owned(),
                expires_at: Instant::now() + Duration::from_secs(u64::from(ttl_seconds)),
            },
        );

        Ok(())
    }

    async fn invalidate(&self, key: &str) -> AppResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gatewarden_application::AuthorizationCache;

    use super::InMemoryAuthorizationCache;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryAuthorizationCache::new();
        let stored = cache.set("authz:t1:role:owner", "{}", 60).await;
        assert!(stored.is_ok());

        let value = cache.get("authz:t1:role:owner").await;
        assert_eq!(value.ok().flatten().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn entries_expire_by_ttl() {
        let cache = InMemoryAuthorizationCache::new();
        let stored = cache.set("authz:t1:check:x", "allow", 1).await;
        assert!(stored.is_ok());

        tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
        let value = cache.get("authz:t1:check:x").await;
        assert_eq!(value.ok().flatten(), None);
    }

    #[tokio::test]
    async fn prefix_invalidation_only_touches_matching_keys() {
        let cache = InMemoryAuthorizationCache::new();
        for key in ["authz:t1:check:a", "authz:t1:check:b", "authz:t2:check:a"] {
            let stored = cache.set(key, "v", 60).await;
            assert!(stored.is_ok());
        }

        let invalidated = cache.invalidate_prefix("authz:t1:").await;
        assert!(invalidated.is_ok());

        assert_eq!(cache.get("authz:t1:check:a").await.ok().flatten(), None);
        assert_eq!(cache.get("authz:t1:check:b").await.ok().flatten(), None);
        assert_eq!(
            cache.get("authz:t2:check:a").await.ok().flatten().as_deref(),
            Some("v")
        );
    }
}
