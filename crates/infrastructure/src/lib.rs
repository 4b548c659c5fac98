//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_evaluation_engine;
mod http_event_publisher;
mod in_memory_authorization_cache;
mod postgres_assignment_repository;
mod postgres_outbox_repository;
mod postgres_role_repository;
mod postgres_tenant_store_repository;
mod redis_authorization_cache;

pub use http_evaluation_engine::HttpEvaluationEngine;
pub use http_event_publisher::HttpEventPublisher;
pub use in_memory_authorization_cache::InMemoryAuthorizationCache;
pub use postgres_assignment_repository::PostgresAssignmentRepository;
pub use postgres_outbox_repository::PostgresOutboxRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use postgres_tenant_store_repository::PostgresTenantStoreRepository;
pub use redis_authorization_cache::RedisAuthorizationCache;
