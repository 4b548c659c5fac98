use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use gatewarden_core::{AppResult, Scope};
use gatewarden_domain::PrincipalRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of one isolated policy store in the evaluation engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(String);

impl StoreId {
    /// Creates a store identifier from the engine-assigned value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw store identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for StoreId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One relationship tuple in the evaluation engine's data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationTuple {
    /// Subject reference, e.g. `user:9f8e...`.
    pub user: String,
    /// Relation name; role assignments use the role identifier.
    pub relation: String,
    /// Object reference, e.g. `scope:org/a`.
    pub object: String,
}

impl RelationTuple {
    /// Builds the tuple binding a principal to a role at a scope.
    #[must_use]
    pub fn role_at_scope(principal: &PrincipalRef, role_id: &str, scope: &Scope) -> Self {
        Self {
            user: principal.to_string(),
            relation: role_id.to_owned(),
            object: format!("scope:{scope}"),
        }
    }
}

/// Client port for the external relationship evaluation engine.
///
/// All operations are network calls and may fail transiently; callers wrap
/// them with the store-router retry policy and a per-call timeout.
#[async_trait]
pub trait EvaluationEngine: Send + Sync {
    /// Creates a new isolated store and returns its identifier.
    async fn create_store(&self, name: &str) -> AppResult<StoreId>;

    /// Deletes a store irreversibly.
    async fn delete_store(&self, store_id: &StoreId) -> AppResult<()>;

    /// Writes an authorization model into a store and returns the
    /// engine-assigned model identifier.
    async fn write_authorization_model(
        &self,
        store_id: &StoreId,
        model: &Value,
    ) -> AppResult<String>;

    /// Evaluates whether the relationship tuple holds.
    async fn check(&self, store_id: &StoreId, tuple: &RelationTuple) -> AppResult<bool>;

    /// Writes a relationship tuple; writing an existing tuple is a no-op.
    async fn write_tuple(&self, store_id: &StoreId, tuple: &RelationTuple) -> AppResult<()>;

    /// Deletes a relationship tuple; deleting a missing tuple is a no-op.
    async fn delete_tuple(&self, store_id: &StoreId, tuple: &RelationTuple) -> AppResult<()>;
}
