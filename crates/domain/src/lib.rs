//! Domain entities and invariants for the authorization core.

#![forbid(unsafe_code)]

mod assignment;
mod check;
mod event;
mod outbox;
mod permission;
mod principal;
mod role;

pub use assignment::RoleAssignment;
pub use check::PermissionCheckResult;
pub use event::DomainEvent;
pub use outbox::{OutboxMessage, OutboxStatus};
pub use permission::Permission;
pub use principal::{Principal, PrincipalRef, PrincipalType};
pub use role::{NewRoleDefinition, RoleDefinition, ScopePattern, builtin_roles};
