//! Application services and ports for the authorization core.

#![forbid(unsafe_code)]

mod assignment_sweep_service;
mod authz_ports;
/// Tenant-namespaced cache key composition.
pub mod cache_keys;
mod health;
mod outbox_service;
mod permission_service;
mod retry;
mod store_router_service;

pub use assignment_sweep_service::AssignmentSweepService;
pub use authz_ports::{
    AssignmentRepository, AuthorizationCache, CacheTtlConfig, ClaimedOutboxMessage, Clock,
    EvaluationEngine, EventPublisher, IdentityProvider, OutboxRepository, OutboxStats,
    RelationTuple, RoleRepository, StoreId, SystemClock, TenantStoreInsert, TenantStoreMapping,
    TenantStoreRepository,
};
pub use health::{HealthService, HealthStatus};
pub use outbox_service::{DispatchOutcome, OutboxConfig, OutboxService};
pub use permission_service::{
    CheckPermissionInput, CreateAssignmentInput, CreateRoleInput, PermissionService,
};
pub use retry::{RetryPolicy, jittered_backoff};
pub use store_router_service::{StoreRouterService, TenantEvaluationClient};
