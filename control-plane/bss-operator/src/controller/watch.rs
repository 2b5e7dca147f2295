//! Bridges API watch streams onto the work queue.

use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::pin;

use futures_util::TryStreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::ReconcileKey;
use crate::builder::labels;
use crate::crd::API_VERSION;
use crate::dispatcher::WorkQueue;

/// Tracks the last seen `metadata.generation` per key so status-only
/// writes do not re-trigger a pass.
#[derive(Debug, Default)]
pub struct GenerationFilter {
    seen: HashMap<ReconcileKey, Option<i64>>,
}

impl GenerationFilter {
    /// Returns the key when `obj` carries a generation not seen before.
    pub fn observe<K: ResourceExt>(&mut self, obj: &K) -> Option<ReconcileKey> {
        let key = ReconcileKey::from_resource(obj);
        let generation = obj.meta().generation;
        match self.seen.insert(key.clone(), generation) {
            Some(prev) if prev == generation => None,
            _ => Some(key),
        }
    }

    pub fn forget<K: ResourceExt>(&mut self, obj: &K) -> ReconcileKey {
        let key = ReconcileKey::from_resource(obj);
        self.seen.remove(&key);
        key
    }
}

/// Key of the BssCluster that controls a child, if any.
pub fn owner_key(meta: &ObjectMeta) -> Option<ReconcileKey> {
    let ns = meta.namespace.as_deref()?;
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|o| o.controller == Some(true) && o.kind == "BssCluster" && o.api_version == API_VERSION)
        .map(|o| ReconcileKey::new(ns, o.name.clone()))
}

async fn drive<K, F>(
    api: Api<K>,
    config: watcher::Config,
    shutdown: CancellationToken,
    mut on_event: F,
) -> anyhow::Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default,
    F: FnMut(Event<K>),
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let mut stream = pin!(watcher::watcher(api, config).default_backoff());
    info!(%kind, "watch started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(%kind, "watch stopped");
                return Ok(());
            }
            next = stream.try_next() => match next {
                Ok(Some(ev)) => on_event(ev),
                Ok(None) => anyhow::bail!("watch stream for {kind} ended"),
                Err(e) => warn!(%kind, error = %e, "watch error"),
            }
        }
    }
}

/// Enqueue managed entities on spec changes and deletions.
pub async fn watch_primary<K>(
    api: Api<K>,
    queue: WorkQueue<ReconcileKey>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default,
{
    let mut filter = GenerationFilter::default();
    drive(api, watcher::Config::default(), shutdown, move |ev| match ev {
        Event::Apply(obj) | Event::InitApply(obj) => {
            if let Some(key) = filter.observe(&obj) {
                trace!(%key, "generation changed");
                queue.add(key);
            }
        }
        Event::Delete(obj) => queue.add(filter.forget(&obj)),
        Event::Init | Event::InitDone => {}
    })
    .await
}

/// Enqueue the owning BssCluster whenever an operator-managed child changes.
pub async fn watch_owned<K>(
    api: Api<K>,
    queue: WorkQueue<ReconcileKey>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default,
{
    let config = watcher::Config::default().labels(&labels::managed_by_selector());
    drive(api, config, shutdown, move |ev| match ev {
        Event::Apply(obj) | Event::InitApply(obj) | Event::Delete(obj) => {
            if let Some(key) = owner_key(obj.meta()) {
                trace!(%key, child = %obj.name_any(), "owned child changed");
                queue.add(key);
            }
        }
        Event::Init | Event::InitDone => {}
    })
    .await
}
