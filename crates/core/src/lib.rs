//! Shared primitives for all Rust crates in Gatewarden.

#![forbid(unsafe_code)]

/// Authenticated caller primitives shared across services.
pub mod identity;
/// Hierarchical scope paths and ancestor queries.
pub mod scope;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use identity::CallerIdentity;
pub use scope::Scope;

/// Result type used across Gatewarden crates.
pub type AppResult<T> = Result<T, AppError>;

/// Tenant identifier used as the partition key for every persisted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Creates a random tenant identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a tenant identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TenantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed hierarchical scope path.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// User is not authenticated or not allowed to access a resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No policy store exists for the tenant.
    #[error("store not found: {0}")]
    StoreNotFound(String),

    /// The evaluation engine stayed unreachable after bounded retries.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// An outbox publication attempt failed.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The cache backing store is unreachable.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether a caller may retry the failed operation as-is.
    ///
    /// Client errors (validation, scope shape, missing resources) are final;
    /// infrastructure errors signal a transient condition the edge may retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::PublishFailed(_) | Self::CacheUnavailable(_)
        )
    }
}
