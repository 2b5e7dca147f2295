use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{ClusterQuery, ClusterQueryFactory, ClusterRecord, QueryError};

const CLUSTER_FIELDS: &str =
    "id name replicas version state readyReplicas createdAt lastUpdateTime";

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Deserialize)]
struct ClusterData {
    cluster: Option<ClusterRecord>,
}

#[derive(Deserialize)]
struct ClustersData {
    #[serde(default)]
    clusters: Option<Vec<ClusterRecord>>,
}

/// GraphQL-over-HTTP client for one endpoint.
#[derive(Clone)]
pub struct GraphQlClient {
    endpoint: String,
    http: reqwest::Client,
}

impl GraphQlClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(endpoint, http))
    }

    pub fn with_http(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<T, QueryError> {
        let mut body = json!({ "query": query });
        if let Some(vars) = variables {
            body["variables"] = vars;
        }
        debug!(endpoint = %self.endpoint, "executing graphql query");
        let res = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = res.status();
        if status != reqwest::StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            return Err(QueryError::Status {
                code: status.as_u16(),
                body,
            });
        }
        let bytes = res.bytes().await?;
        let parsed: GraphQlResponse = serde_json::from_slice(&bytes)?;
        if !parsed.errors.is_empty() {
            return Err(QueryError::Remote(
                parsed.errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        Ok(serde_json::from_value(parsed.data.unwrap_or_else(|| json!({})))?)
    }
}

#[async_trait]
impl ClusterQuery for GraphQlClient {
    async fn get_cluster(&self, id: &str) -> Result<Option<ClusterRecord>, QueryError> {
        let query = format!(
            "query GetCluster($id: String!) {{ cluster(id: $id) {{ {CLUSTER_FIELDS} }} }}"
        );
        let data: ClusterData = self.execute(&query, Some(json!({ "id": id }))).await?;
        Ok(data.cluster)
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>, QueryError> {
        let query = format!("query ListClusters {{ clusters {{ {CLUSTER_FIELDS} }} }}");
        let data: ClustersData = self.execute(&query, None).await?;
        Ok(data.clusters.unwrap_or_default())
    }
}

/// Hands out [`GraphQlClient`]s sharing one connection pool.
#[derive(Clone)]
pub struct GraphQlClientFactory {
    http: reqwest::Client,
}

impl GraphQlClientFactory {
    pub fn new(timeout: Duration) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

impl ClusterQueryFactory for GraphQlClientFactory {
    fn client_for(&self, endpoint: &str) -> Result<Arc<dyn ClusterQuery>, QueryError> {
        Ok(Arc::new(GraphQlClient::with_http(endpoint, self.http.clone())))
    }
}
