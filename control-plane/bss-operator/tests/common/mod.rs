#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bss_operator::builder::{ChildManifest, ChildRef};
use bss_operator::controller::{ChildStore, EntityStore, ReconcileKey};
use bss_operator::crd::{BssCluster, BssClusterSpec, BssQuery, BssQuerySpec, StatusCarrier};
use bss_operator::error::StoreError;
use bss_operator::query_client::{ClusterQuery, ClusterQueryFactory, ClusterRecord, QueryError};
use chrono::{TimeZone, Utc};
use kube::{Resource, ResourceExt};

pub fn cluster(ns: &str, name: &str, spec: BssClusterSpec) -> BssCluster {
    let mut c = BssCluster::new(name, spec);
    c.metadata.namespace = Some(ns.into());
    c.metadata.uid = Some(format!("uid-{name}"));
    c.metadata.generation = Some(1);
    c
}

pub fn cluster_spec(image: &str, replicas: Option<i32>) -> BssClusterSpec {
    BssClusterSpec {
        image: image.into(),
        replicas,
        version: None,
        port: None,
        expose: None,
    }
}

pub fn query(ns: &str, name: &str, spec: BssQuerySpec) -> BssQuery {
    let mut q = BssQuery::new(name, spec);
    q.metadata.namespace = Some(ns.into());
    q.metadata.uid = Some(format!("uid-{name}"));
    q.metadata.generation = Some(1);
    q
}

pub fn record(id: &str, state: &str) -> ClusterRecord {
    let t = Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap();
    ClusterRecord {
        id: id.into(),
        name: format!("cluster-{id}"),
        replicas: 3,
        version: "1.4.2".into(),
        state: state.into(),
        ready_replicas: 3,
        created_at: t,
        last_update_time: t,
    }
}

/// In-memory entity store with status-write accounting.
pub struct MemoryEntityStore<K> {
    objects: Mutex<HashMap<ReconcileKey, K>>,
    status_writes: AtomicUsize,
    fail_status_writes: AtomicUsize,
}

impl<K> Default for MemoryEntityStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            status_writes: AtomicUsize::new(0),
            fail_status_writes: AtomicUsize::new(0),
        }
    }
}

impl<K> MemoryEntityStore<K>
where
    K: Resource + StatusCarrier + Clone,
{
    pub fn insert(&self, obj: K) -> ReconcileKey {
        let key = ReconcileKey::from_resource(&obj);
        self.objects.lock().unwrap().insert(key.clone(), obj);
        key
    }

    pub fn remove(&self, key: &ReconcileKey) {
        self.objects.lock().unwrap().remove(key);
    }

    pub fn current(&self, key: &ReconcileKey) -> K {
        self.objects.lock().unwrap().get(key).cloned().expect("object present")
    }

    /// Simulate a user edit: mutate the object and bump its generation.
    pub fn edit(&self, key: &ReconcileKey, f: impl FnOnce(&mut K)) {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(key).expect("object present");
        f(obj);
        let meta = obj.meta_mut();
        meta.generation = Some(meta.generation.unwrap_or(0) + 1);
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn fail_next_status_writes(&self, n: usize) {
        self.fail_status_writes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl<K> EntityStore<K> for MemoryEntityStore<K>
where
    K: Resource + StatusCarrier + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &ReconcileKey) -> Result<Option<K>, StoreError> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn publish_status(&self, obj: &K) -> Result<K, StoreError> {
        let pending = self.fail_status_writes.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_status_writes.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Api("injected status failure".into()));
        }
        let key = ReconcileKey::from_resource(obj);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found("entity", obj.name_any()))?;
        *stored.status_mut() = obj.status().cloned().unwrap_or_default();
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Create,
    Update,
    Delete,
}

/// In-memory child store that records every call.
#[derive(Default)]
pub struct MemoryChildStore {
    objects: Mutex<BTreeMap<ChildRef, ChildManifest>>,
    log: Mutex<Vec<(Op, ChildRef)>>,
    failures: Mutex<HashMap<Op, usize>>,
    revision: AtomicUsize,
}

impl MemoryChildStore {
    pub fn seed(&self, mut child: ChildManifest) {
        let rv = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        child.meta_mut().resource_version = Some(rv.to_string());
        self.objects.lock().unwrap().insert(child.child_ref(), child);
    }

    pub fn get_child(&self, id: &ChildRef) -> Option<ChildManifest> {
        self.objects.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn calls(&self, op: Op) -> Vec<ChildRef> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Number of mutating calls seen so far.
    pub fn writes(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o != Op::Get)
            .count()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Make the next `n` calls of `op` fail with an API error.
    pub fn fail_next(&self, op: Op, n: usize) {
        self.failures.lock().unwrap().insert(op, n);
    }

    fn record(&self, op: Op, id: &ChildRef) -> Result<(), StoreError> {
        self.log.lock().unwrap().push((op, id.clone()));
        let mut failures = self.failures.lock().unwrap();
        if let Some(n) = failures.get_mut(&op) {
            if *n > 0 {
                *n -= 1;
                return Err(StoreError::Api(format!("injected {op:?} failure")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChildStore for MemoryChildStore {
    async fn get(&self, id: &ChildRef) -> Result<Option<ChildManifest>, StoreError> {
        self.record(Op::Get, id)?;
        Ok(self.get_child(id))
    }

    async fn create(&self, child: &ChildManifest) -> Result<ChildManifest, StoreError> {
        let id = child.child_ref();
        self.record(Op::Create, &id)?;
        if self.objects.lock().unwrap().contains_key(&id) {
            return Err(StoreError::Conflict(format!("{id} already exists")));
        }
        self.seed(child.clone());
        Ok(self.get_child(&id).expect("just created"))
    }

    async fn update(&self, child: &ChildManifest) -> Result<ChildManifest, StoreError> {
        let id = child.child_ref();
        self.record(Op::Update, &id)?;
        let live_rv = match self.get_child(&id) {
            Some(live) => live.meta().resource_version.clone(),
            None => return Err(StoreError::not_found(id.kind.as_str(), &id.name)),
        };
        if child.meta().resource_version != live_rv {
            return Err(StoreError::Conflict(format!("{id}: stale resourceVersion")));
        }
        self.seed(child.clone());
        Ok(self.get_child(&id).expect("just updated"))
    }

    async fn delete(&self, id: &ChildRef) -> Result<(), StoreError> {
        self.record(Op::Delete, id)?;
        match self.objects.lock().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(id.kind.as_str(), &id.name)),
        }
    }
}

/// Produce a genuine connection-level reqwest error.
pub async fn transport_error() -> QueryError {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let err = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/graphql"))
        .send()
        .await
        .expect_err("nothing listens on a released port");
    QueryError::Transport(err)
}

#[derive(Debug, Clone)]
pub enum Reply {
    Clusters(Vec<ClusterRecord>),
    TransportFailure,
}

/// Scripted inventory: replies are consumed in order, then `steady` repeats.
#[derive(Clone)]
pub struct FakeInventory {
    inner: Arc<FakeInner>,
}

struct FakeInner {
    script: Mutex<VecDeque<Reply>>,
    steady: Mutex<Reply>,
    endpoints: Mutex<Vec<String>>,
}

impl FakeInventory {
    pub fn new(steady: Reply) -> Self {
        Self {
            inner: Arc::new(FakeInner {
                script: Mutex::new(VecDeque::new()),
                steady: Mutex::new(steady),
                endpoints: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn then(&self, reply: Reply) -> &Self {
        self.inner.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn set_steady(&self, reply: Reply) {
        *self.inner.steady.lock().unwrap() = reply;
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.inner.endpoints.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        self.inner
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.inner.steady.lock().unwrap().clone())
    }
}

#[async_trait]
impl ClusterQuery for FakeInventory {
    async fn get_cluster(&self, id: &str) -> Result<Option<ClusterRecord>, QueryError> {
        match self.next_reply() {
            Reply::Clusters(all) => Ok(all.into_iter().find(|c| c.id == id)),
            Reply::TransportFailure => Err(transport_error().await),
        }
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterRecord>, QueryError> {
        match self.next_reply() {
            Reply::Clusters(all) => Ok(all),
            Reply::TransportFailure => Err(transport_error().await),
        }
    }
}

impl ClusterQueryFactory for FakeInventory {
    fn client_for(&self, endpoint: &str) -> Result<Arc<dyn ClusterQuery>, QueryError> {
        self.inner.endpoints.lock().unwrap().push(endpoint.to_string());
        Ok(Arc::new(self.clone()))
    }
}

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

// Env guard utilities
pub struct EnvGuard {
    key: &'static str,
    old: Option<String>,
}
impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(ref v) = self.old {
                std::env::set_var(self.key, v);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }
}
pub fn set_env(key: &'static str, val: &str) -> EnvGuard {
    let old = std::env::var(key).ok();
    unsafe {
        std::env::set_var(key, val);
    }
    EnvGuard { key, old }
}

// Stops the controller and deletes the test BssCluster on drop; children
// follow through their owner references.
pub struct ControllerGuard {
    ns: String,
    name: String,
    client: kube::Client,
    shutdown: tokio_util::sync::CancellationToken,
}

impl ControllerGuard {
    pub fn new(
        ns: &str,
        name: &str,
        client: kube::Client,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> Self {
        Self {
            ns: ns.to_string(),
            name: name.to_string(),
            client,
            shutdown,
        }
    }
}

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let api: kube::Api<BssCluster> = kube::Api::namespaced(self.client.clone(), &self.ns);
        let name = self.name.clone();
        let _ = tokio::spawn(async move {
            let _ = api.delete(&name, &Default::default()).await;
        });
    }
}
