use std::time::Duration;

use envconfig::Envconfig;

use crate::dispatcher::BackoffPolicy;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    #[envconfig(from = "HTTP_PORT", default = "8081")]
    pub http_port: u16,

    /// Restrict watches to one namespace; unset watches all namespaces.
    /// Env: BSS_OPERATOR_WATCH_NAMESPACE
    #[envconfig(from = "BSS_OPERATOR_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Number of concurrent reconcile workers per controller.
    #[envconfig(from = "BSS_OPERATOR_WORKERS", default = "4")]
    pub workers: usize,

    #[envconfig(nested)]
    pub features: FeaturesConfig,

    #[envconfig(nested)]
    pub requeue: RequeueConfig,

    #[envconfig(nested)]
    pub query: QueryConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct FeaturesConfig {
    #[envconfig(from = "BSS_OPERATOR_FEATURES_CLUSTER", default = "true")]
    pub cluster: bool,
    #[envconfig(from = "BSS_OPERATOR_FEATURES_QUERY", default = "true")]
    pub query: bool,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RequeueConfig {
    /// Refresh interval used when a BssQuery does not set a positive one.
    #[envconfig(from = "BSS_OPERATOR_DEFAULT_REFRESH_SECS", default = "30")]
    pub default_refresh_secs: u64,
    /// Lower bound applied to any periodic requeue.
    #[envconfig(from = "BSS_OPERATOR_MIN_REFRESH_SECS", default = "5")]
    pub min_refresh_secs: u64,
    /// First retry delay after a transient failure.
    #[envconfig(from = "BSS_OPERATOR_RETRY_BASE_MS", default = "1000")]
    pub retry_base_ms: u64,
    #[envconfig(from = "BSS_OPERATOR_RETRY_MAX_SECS", default = "300")]
    pub retry_max_secs: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct QueryConfig {
    /// HTTP timeout for calls to the external query endpoint.
    /// Env: BSS_OPERATOR_QUERY_TIMEOUT_SECS
    #[envconfig(from = "BSS_OPERATOR_QUERY_TIMEOUT_SECS", default = "30")]
    pub timeout_secs: u64,
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Scheduling knobs handed to reconcilers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshSettings {
    pub default_refresh: Duration,
    pub min_refresh: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            default_refresh: Duration::from_secs(30),
            min_refresh: Duration::from_secs(5),
        }
    }
}

impl RequeueConfig {
    pub fn refresh_settings(&self) -> RefreshSettings {
        let min_refresh = Duration::from_secs(self.min_refresh_secs.max(1));
        RefreshSettings {
            default_refresh: Duration::from_secs(self.default_refresh_secs)
                .max(min_refresh),
            min_refresh,
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        let base = Duration::from_millis(self.retry_base_ms.max(1));
        BackoffPolicy::new(
            base,
            Duration::from_secs(self.retry_max_secs).max(base),
        )
    }
}

impl OperatorConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}
