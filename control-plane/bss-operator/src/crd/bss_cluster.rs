use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

pub const DEFAULT_REPLICAS: i32 = 1;
pub const DEFAULT_PORT: i32 = 8080;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "bss.localhost",
    version = "v1alpha1",
    kind = "BssCluster",
    plural = "bssclusters",
    shortname = "bssc",
    namespaced,
    status = "BssClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BssClusterSpec {
    /// Container image for the cluster workload (required)
    #[serde(default)]
    pub image: String,
    /// Desired replica count; defaults to 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Informational version, stamped on child labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Container and service port; defaults to 8080
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// Whether to keep a Service in front of the workload; defaults to true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<bool>,
}

impl BssClusterSpec {
    pub fn replicas_or_default(&self) -> i32 {
        self.replicas.unwrap_or(DEFAULT_REPLICAS)
    }

    pub fn port_or_default(&self) -> i32 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn exposed(&self) -> bool {
        self.expose.unwrap_or(true)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BssClusterStatus {
    /// Reconciling | Ready | Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Time of the last fully successful pass (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Children applied by the last successful pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_refs: Vec<ResourceRef>,
}

#[derive(
    Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq,
)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterPhase {
    Reconciling,
    Ready,
    Failed,
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Reconciling => "Reconciling",
            ClusterPhase::Ready => "Ready",
            ClusterPhase::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
