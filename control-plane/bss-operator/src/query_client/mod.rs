//! Client seam for the remote cluster-inventory service.

mod graphql;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use graphql::{GraphQlClient, GraphQlClientFactory};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code {code}: {body}")]
    Status { code: u16, body: String },

    #[error("graphql errors: {}", .0.join("; "))]
    Remote(Vec<String>),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("cluster {0} not found")]
    NotFound(String),
}

/// A cluster as reported by the inventory service. Every field is nullable
/// in the remote schema; null or missing values decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub replicas: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ready_replicas: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "null_as_default")]
    pub last_update_time: DateTime<Utc>,
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// `Ok(None)` when the service has no cluster with that id.
    async fn get_cluster(&self, id: &str) -> Result<Option<ClusterRecord>, QueryError>;

    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>, QueryError>;
}

/// Builds a client for an endpoint read from the entity spec.
pub trait ClusterQueryFactory: Send + Sync {
    fn client_for(&self, endpoint: &str) -> Result<Arc<dyn ClusterQuery>, QueryError>;
}
