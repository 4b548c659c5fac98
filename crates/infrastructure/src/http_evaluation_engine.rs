use async_trait::async_trait;
use gatewarden_application::{EvaluationEngine, RelationTuple, StoreId};
use gatewarden_core::{AppError, AppResult};
use serde::Deserialize;
use serde_json::{Value, json};

/// HTTP client for an OpenFGA-style relationship evaluation engine.
///
/// Transport errors, 5xx responses, and throttling map to
/// `StoreUnavailable` so the store router's retry policy re-attempts them;
/// other client errors are terminal.
pub struct HttpEvaluationEngine {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CreateStoreResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WriteAuthorizationModelResponse {
    authorization_model_id: String,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    allowed: bool,
}

impl HttpEvaluationEngine {
    /// Creates an engine client against the given base URL.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> AppResult<reqwest::Response> {
        let response = request.send().await.map_err(|error| {
            AppError::StoreUnavailable(format!(
                "evaluation engine {operation} transport error: {error}"
            ))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::StoreNotFound(format!(
                "evaluation engine {operation} target does not exist: {body}"
            )));
        }

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::StoreUnavailable(format!(
                "evaluation engine {operation} returned status {status}: {body}"
            )));
        }

        Err(AppError::Validation(format!(
            "evaluation engine {operation} rejected the request with status {status}: {body}"
        )))
    }
}

#[async_trait]
impl EvaluationEngine for HttpEvaluationEngine {
    async fn create_store(&self, name: &str) -> AppResult<StoreId> {
        let response = self
            .send(
                "store create",
                self.http_client
                    .post(self.endpoint("/stores"))
                    .json(&json!({ "name": name })),
            )
            .await?;

        let body: CreateStoreResponse = response.json().await.map_err(|error| {
            AppError::StoreUnavailable(format!(
                "failed to parse store create response: {error}"
            ))
        })?;

        Ok(StoreId::new(body.id))
    }

    async fn delete_store(&self, store_id: &StoreId) -> AppResult<()> {
        self.send(
            "store delete",
            self.http_client
                .delete(self.endpoint(format!("/stores/{store_id}").as_str())),
        )
        .await?;

        Ok(())
    }

    async fn write_authorization_model(
        &self,
        store_id: &StoreId,
        model: &Value,
    ) -> AppResult<String> {
        let response = self
            .send(
                "model write",
                self.http_client
                    .post(self.endpoint(
                        format!("/stores/{store_id}/authorization-models").as_str(),
                    ))
                    .json(model),
            )
            .await?;

        let body: WriteAuthorizationModelResponse = response.json().await.map_err(|error| {
            AppError::StoreUnavailable(format!(
                "failed to parse model write response: {error}"
            ))
        })?;

        Ok(body.authorization_model_id)
    }

    async fn check(&self, store_id: &StoreId, tuple: &RelationTuple) -> AppResult<bool> {
        let response = self
            .send(
                "check",
                self.http_client
                    .post(self.endpoint(format!("/stores/{store_id}/check").as_str()))
                    .json(&json!({
                        "tuple_key": {
                            "user": tuple.user,
                            "relation": tuple.relation,
                            "object": tuple.object,
                        }
                    })),
            )
            .await?;

        let body: CheckResponse = response.json().await.map_err(|error| {
            AppError::StoreUnavailable(format!("failed to parse check response: {error}"))
        })?;

        Ok(body.allowed)
    }

    async fn write_tuple(&self, store_id: &StoreId, tuple: &RelationTuple) -> AppResult<()> {
        self.send(
            "tuple write",
            self.http_client
                .post(self.endpoint(format!("/stores/{store_id}/write").as_str()))
                .json(&json!({
                    "writes": {
                        "tuple_keys": [{
                            "user": tuple.user,
                            "relation": tuple.relation,
                            "object": tuple.object,
                        }]
                    }
                })),
        )
        .await?;

        Ok(())
    }

    async fn delete_tuple(&self, store_id: &StoreId, tuple: &RelationTuple) -> AppResult<()> {
        self.send(
            "tuple delete",
            self.http_client
                .post(self.endpoint(format!("/stores/{store_id}/write").as_str()))
                .json(&json!({
                    "deletes": {
                        "tuple_keys": [{
                            "user": tuple.user,
                            "relation": tuple.relation,
                            "object": tuple.object,
                        }]
                    }
                })),
        )
        .await?;

        Ok(())
    }
}
