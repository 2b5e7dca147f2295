use std::time::Duration;

use thiserror::Error;

use crate::controller::apply::ApplyError;
use crate::controller::ReconcileKey;
use crate::dispatcher::{Retry, Retryable};
use crate::query_client::QueryError;
use crate::validation::ValidationError;

/// Failure of a host-platform object API call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("api error: {0}")]
    Api(String),
}

impl StoreError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Map a kube client error, keeping 404 and 409 distinguishable.
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => {
                StoreError::not_found(kind, name)
            }
            kube::Error::Api(ae) if ae.code == 409 => {
                StoreError::Conflict(ae.message.clone())
            }
            _ => StoreError::Api(err.to_string()),
        }
    }
}

/// Outcome of a failed convergence pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Permanent, spec-level; waits for the next spec change.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to fetch {key}: {source}")]
    Fetch {
        key: ReconcileKey,
        #[source]
        source: StoreError,
    },

    #[error("failed to converge children: {0}")]
    Apply(#[from] ApplyError),

    #[error("query failed: {source}")]
    Query {
        #[source]
        source: QueryError,
        retry_after: Duration,
    },

    #[error("failed to publish status: {0}")]
    StatusWrite(#[source] StoreError),
}

impl Retryable for ReconcileError {
    fn retry(&self) -> Retry {
        match self {
            ReconcileError::Validation(_) => Retry::AwaitChange,
            ReconcileError::Query { retry_after, .. } => {
                Retry::After(*retry_after)
            }
            ReconcileError::Fetch { .. }
            | ReconcileError::Apply(_)
            | ReconcileError::StatusWrite(_) => Retry::Backoff,
        }
    }
}
