use crate::crd::{BssClusterSpec, BssQuerySpec, QueryKind};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Precondition checks on a desired-state spec. Pure; no I/O.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for BssClusterSpec {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.image.trim().is_empty() {
            return Err(ValidationError::new("spec.image is required"));
        }
        if self.replicas.is_some_and(|r| r < 0) {
            return Err(ValidationError::new(
                "spec.replicas must be non-negative",
            ));
        }
        if self.port.is_some_and(|p| !(1..=65535).contains(&p)) {
            return Err(ValidationError::new(
                "spec.port must be between 1 and 65535",
            ));
        }
        Ok(())
    }
}

impl Validate for BssQuerySpec {
    fn validate(&self) -> Result<(), ValidationError> {
        let endpoint = self.api_endpoint.trim();
        if endpoint.is_empty() {
            return Err(ValidationError::new("APIEndpoint required"));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ValidationError::new(
                "APIEndpoint must start with http:// or https://",
            ));
        }
        if self.query == QueryKind::Cluster
            && self.cluster_id.as_deref().is_none_or(|id| id.trim().is_empty())
        {
            return Err(ValidationError::new(
                "ClusterID required for cluster query type",
            ));
        }
        Ok(())
    }
}
