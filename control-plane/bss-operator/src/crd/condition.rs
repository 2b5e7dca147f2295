use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const REASON_RECONCILING: &str = "Reconciling";
pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";
pub const REASON_QUERY_SUCCESS: &str = "QuerySuccess";
pub const REASON_QUERY_FAILED: &str = "QueryFailed";
pub const REASON_INVALID_CONFIG: &str = "InvalidConfig";

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    Available,
    Degraded,
    #[serde(other)]
    Unknown,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
