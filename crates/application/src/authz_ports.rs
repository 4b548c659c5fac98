//! Ports consumed by the application services.

mod cache;
mod clock;
mod engine;
mod identity;
mod publisher;
mod repositories;

pub use cache::{AuthorizationCache, CacheTtlConfig};
pub use clock::{Clock, SystemClock};
pub use engine::{EvaluationEngine, RelationTuple, StoreId};
pub use identity::IdentityProvider;
pub use publisher::EventPublisher;
pub use repositories::{
    AssignmentRepository, ClaimedOutboxMessage, OutboxRepository, OutboxStats, RoleRepository,
    TenantStoreInsert, TenantStoreMapping, TenantStoreRepository,
};
