use async_trait::async_trait;
use gatewarden_core::{AppResult, CallerIdentity};
use gatewarden_domain::Principal;

/// Identity-provider lookup port.
///
/// Used only to resolve a caller's default principal when a check request
/// does not name one explicitly; synchronization of users and groups is an
/// external concern.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves the principal behind an authenticated caller.
    async fn resolve_principal(&self, caller: &CallerIdentity) -> AppResult<Principal>;
}
