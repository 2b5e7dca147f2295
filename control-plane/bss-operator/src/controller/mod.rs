pub mod apply;
mod cluster;
pub mod conditions;
mod query;
pub mod status;
pub mod store;
mod watch;

use std::fmt;
use std::sync::Arc;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{OperatorConfig, RefreshSettings};
use crate::crd::{BssCluster, BssQuery};
use crate::dispatcher::{Dispatcher, WorkQueue};
use crate::query_client::{ClusterQueryFactory, GraphQlClientFactory};

pub use cluster::reconcile_cluster;
pub use query::{QueryPlan, execute_plan, reconcile_query, refresh_interval};
pub use store::{ChildStore, EntityStore, KubeChildStore, KubeEntityStore};
pub use watch::{owner_key, GenerationFilter};

/// Unit of scheduling and per-key serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_resource<K: ResourceExt>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Dependencies of the BssCluster reconciler.
pub struct ClusterContext {
    pub entities: Arc<dyn EntityStore<BssCluster>>,
    pub children: Arc<dyn ChildStore>,
}

/// Dependencies of the BssQuery reconciler.
pub struct QueryContext {
    pub entities: Arc<dyn EntityStore<BssQuery>>,
    pub queries: Arc<dyn ClusterQueryFactory>,
    pub refresh: RefreshSettings,
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the worker pool alongside its watches. A watch failure cancels
/// `shutdown` but in-flight passes still run to completion.
async fn join_workers<W, S>(work: W, watches: S, shutdown: &CancellationToken) -> anyhow::Result<()>
where
    W: Future<Output = ()>,
    S: Future<Output = anyhow::Result<()>>,
{
    let watches = async {
        let res = watches.await;
        if let Err(e) = &res {
            warn!(error = %e, "watch failed; draining workers");
            shutdown.cancel();
        }
        res
    };
    let ((), watched) = tokio::join!(work, watches);
    watched
}

pub async fn run_cluster_controller(
    client: Client,
    cfg: OperatorConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let ctx = Arc::new(ClusterContext {
        entities: Arc::new(KubeEntityStore::<BssCluster>::new(client.clone())),
        children: Arc::new(KubeChildStore::new(client.clone())),
    });
    let ns = cfg.watch_namespace.as_deref();
    let clusters: Api<BssCluster> = scoped_api(&client, ns);
    let deployments: Api<Deployment> = scoped_api(&client, ns);
    let services: Api<Service> = scoped_api(&client, ns);

    let queue = WorkQueue::new(cfg.requeue.backoff_policy());
    let dispatcher = Dispatcher::new("bsscluster", queue.clone(), cfg.worker_count());
    info!(namespace = ?cfg.watch_namespace, workers = cfg.worker_count(), "starting BssCluster controller");

    let work = dispatcher.run(
        move |key| {
            let ctx = ctx.clone();
            async move { reconcile_cluster(key, ctx).await }
        },
        shutdown.clone(),
    );
    let watches = async {
        tokio::try_join!(
            watch::watch_primary(clusters, queue.clone(), shutdown.clone()),
            watch::watch_owned(deployments, queue.clone(), shutdown.clone()),
            watch::watch_owned(services, queue.clone(), shutdown.clone()),
        )
        .map(|_| ())
    };
    join_workers(work, watches, &shutdown).await?;
    info!("BssCluster controller stopped");
    Ok(())
}

pub async fn run_query_controller(
    client: Client,
    cfg: OperatorConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let factory = GraphQlClientFactory::new(cfg.query.timeout())?;
    let ctx = Arc::new(QueryContext {
        entities: Arc::new(KubeEntityStore::<BssQuery>::new(client.clone())),
        queries: Arc::new(factory),
        refresh: cfg.requeue.refresh_settings(),
    });
    let queries: Api<BssQuery> = scoped_api(&client, cfg.watch_namespace.as_deref());

    let queue = WorkQueue::new(cfg.requeue.backoff_policy());
    let dispatcher = Dispatcher::new("bssquery", queue.clone(), cfg.worker_count());
    info!(namespace = ?cfg.watch_namespace, workers = cfg.worker_count(), "starting BssQuery controller");

    let work = dispatcher.run(
        move |key| {
            let ctx = ctx.clone();
            async move { reconcile_query(key, ctx).await }
        },
        shutdown.clone(),
    );
    let watches = watch::watch_primary(queries, queue.clone(), shutdown.clone());
    join_workers(work, watches, &shutdown).await?;
    info!("BssQuery controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn watch_failure_lets_in_flight_pass_finish() {
        let shutdown = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let work = {
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                finished.store(true, Ordering::SeqCst);
            }
        };
        let watches = async { Err(anyhow::anyhow!("watch stream ended")) };

        let res = join_workers(work, watches, &shutdown).await;
        assert!(res.is_err());
        assert!(shutdown.is_cancelled());
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn clean_stop_is_ok() {
        let shutdown = CancellationToken::new();
        join_workers(async {}, async { Ok(()) }, &shutdown).await.unwrap();
        assert!(!shutdown.is_cancelled());
    }
}
