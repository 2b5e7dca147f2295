//! Object-store seams over the Kubernetes API.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::ReconcileKey;
use crate::builder::{ChildKind, ChildManifest, ChildRef};
use crate::crd::StatusCarrier;
use crate::error::StoreError;

/// Read access to managed entities plus the single status write.
#[async_trait]
pub trait EntityStore<K>: Send + Sync {
    /// `Ok(None)` when the entity no longer exists.
    async fn get(&self, key: &ReconcileKey) -> Result<Option<K>, StoreError>;

    /// Persist `obj.status` and return the server's copy.
    async fn publish_status(&self, obj: &K) -> Result<K, StoreError>;
}

/// Child-resource object API.
#[async_trait]
pub trait ChildStore: Send + Sync {
    async fn get(&self, id: &ChildRef) -> Result<Option<ChildManifest>, StoreError>;
    async fn create(&self, child: &ChildManifest) -> Result<ChildManifest, StoreError>;
    /// Full replace; `metadata.resourceVersion` must be carried forward.
    async fn update(&self, child: &ChildManifest) -> Result<ChildManifest, StoreError>;
    async fn delete(&self, id: &ChildRef) -> Result<(), StoreError>;
}

pub struct KubeEntityStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeEntityStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K> EntityStore<K> for KubeEntityStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + StatusCarrier
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, key: &ReconcileKey) -> Result<Option<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        api.get_opt(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(&K::kind(&()), &key.name, e))
    }

    async fn publish_status(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let ns = obj.namespace().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), &ns);
        let patch = json!({ "status": obj.status() });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(&K::kind(&()), &name, e))
    }
}

pub struct KubeChildStore {
    client: Client,
}

impl KubeChildStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, ns: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), ns)
    }

    fn services(&self, ns: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), ns)
    }
}

#[async_trait]
impl ChildStore for KubeChildStore {
    async fn get(&self, id: &ChildRef) -> Result<Option<ChildManifest>, StoreError> {
        let res = match id.kind {
            ChildKind::Deployment => self
                .deployments(&id.namespace)
                .get_opt(&id.name)
                .await
                .map(|o| o.map(ChildManifest::Deployment)),
            ChildKind::Service => self
                .services(&id.namespace)
                .get_opt(&id.name)
                .await
                .map(|o| o.map(ChildManifest::Service)),
        };
        res.map_err(|e| StoreError::from_kube(id.kind.as_str(), &id.name, e))
    }

    async fn create(&self, child: &ChildManifest) -> Result<ChildManifest, StoreError> {
        let pp = PostParams::default();
        let res = match child {
            ChildManifest::Deployment(d) => self
                .deployments(child.namespace())
                .create(&pp, d)
                .await
                .map(ChildManifest::Deployment),
            ChildManifest::Service(s) => self
                .services(child.namespace())
                .create(&pp, s)
                .await
                .map(ChildManifest::Service),
        };
        res.map_err(|e| StoreError::from_kube(child.kind().as_str(), child.name(), e))
    }

    async fn update(&self, child: &ChildManifest) -> Result<ChildManifest, StoreError> {
        let pp = PostParams::default();
        let res = match child {
            ChildManifest::Deployment(d) => self
                .deployments(child.namespace())
                .replace(child.name(), &pp, d)
                .await
                .map(ChildManifest::Deployment),
            ChildManifest::Service(s) => self
                .services(child.namespace())
                .replace(child.name(), &pp, s)
                .await
                .map(ChildManifest::Service),
        };
        res.map_err(|e| StoreError::from_kube(child.kind().as_str(), child.name(), e))
    }

    async fn delete(&self, id: &ChildRef) -> Result<(), StoreError> {
        let dp = DeleteParams::background();
        let res = match id.kind {
            ChildKind::Deployment => self
                .deployments(&id.namespace)
                .delete(&id.name, &dp)
                .await
                .map(|_| ()),
            ChildKind::Service => self
                .services(&id.namespace)
                .delete(&id.name, &dp)
                .await
                .map(|_| ()),
        };
        res.map_err(|e| StoreError::from_kube(id.kind.as_str(), &id.name, e))
    }
}
