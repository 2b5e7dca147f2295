use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "bss.localhost",
    version = "v1alpha1",
    kind = "BssQuery",
    plural = "bssqueries",
    shortname = "bssq",
    namespaced,
    status = "BssQueryStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BssQuerySpec {
    /// URL of the BSS API GraphQL endpoint
    #[serde(default)]
    pub api_endpoint: String,
    /// What to query: a single cluster or the full listing
    pub query: QueryKind,
    /// Cluster to look up; required for `cluster` queries
    #[serde(
        rename = "clusterID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cluster_id: Option<String>,
    /// Seconds between refreshes; unset or non-positive uses the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<i32>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Cluster,
    Clusters,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKind::Cluster => write!(f, "cluster"),
            QueryKind::Clusters => write!(f, "clusters"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BssQueryStatus {
    /// Time of the last successful query (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_query_time: Option<String>,
    /// JSON result of the last successful query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Number of clusters in `result`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
