//! Minimal GraphQL-over-HTTP client for subgraph queries

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::SourceError;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Posts queries to a single subgraph endpoint
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    client: Client,
    endpoint: String,
}

impl GraphQlClient {
    /// `client` carries the request timeout and can be shared across sources
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run `query` with `variables` and decode the `data` member into `T`
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, SourceError> {
        let body = json!({ "query": query, "variables": variables });

        debug!(endpoint = %self.endpoint, "Posting subgraph query");
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let payload: GraphQlResponse<T> = response.json().await?;
        if let Some(first) = payload.errors.first() {
            return Err(SourceError::Decode(format!(
                "subgraph returned {} error(s): {}",
                payload.errors.len(),
                first.message
            )));
        }

        payload
            .data
            .ok_or_else(|| SourceError::MissingField("data".to_string()))
    }
}
