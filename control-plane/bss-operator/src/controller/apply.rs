//! Create-or-update convergence of individual child resources.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::store::ChildStore;
use crate::builder::labels::LABEL_VERSION;
use crate::builder::{ChildManifest, ChildRef};
use crate::crd::BssCluster;
use crate::error::StoreError;

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("failed to get {child}: {source}")]
    Get {
        child: ChildRef,
        #[source]
        source: StoreError,
    },

    #[error("failed to create {child}: {source}")]
    Create {
        child: ChildRef,
        #[source]
        source: StoreError,
    },

    #[error("failed to update {child}: {source}")]
    Update {
        child: ChildRef,
        #[source]
        source: StoreError,
    },

    #[error("failed to delete {child}: {source}")]
    Delete {
        child: ChildRef,
        #[source]
        source: StoreError,
    },

    #[error("owner {0} has no uid yet")]
    MissingOwnerUid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    /// Decommission target was already gone.
    Absent,
    /// Decommission target exists but is not controlled by this owner.
    Foreign,
}

impl ApplyOutcome {
    /// Whether a write was issued.
    pub fn applied(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Created | ApplyOutcome::Updated | ApplyOutcome::Deleted
        )
    }
}

/// Controller owner reference pointing at `cluster`.
pub fn owner_reference(cluster: &BssCluster) -> Result<OwnerReference, ApplyError> {
    cluster
        .controller_owner_ref(&())
        .ok_or_else(|| ApplyError::MissingOwnerUid(cluster.name_any()))
}

/// Converge one child: create when absent, otherwise replace only when a
/// managed field drifted. Issues at most one write.
pub async fn reconcile_child(
    store: &dyn ChildStore,
    owner: &OwnerReference,
    mut desired: ChildManifest,
) -> Result<ApplyOutcome, ApplyError> {
    let child = desired.child_ref();
    let existing = store.get(&child).await.map_err(|source| ApplyError::Get {
        child: child.clone(),
        source,
    })?;

    let Some(live) = existing else {
        set_owner_reference(desired.meta_mut(), owner);
        store
            .create(&desired)
            .await
            .map_err(|source| ApplyError::Create {
                child: child.clone(),
                source,
            })?;
        info!(%child, "created child");
        return Ok(ApplyOutcome::Created);
    };

    carry_forward(&live, &mut desired);
    set_owner_reference(desired.meta_mut(), owner);
    if !needs_update(&live, &desired, owner) {
        debug!(%child, "child up to date");
        return Ok(ApplyOutcome::Unchanged);
    }
    store
        .update(&desired)
        .await
        .map_err(|source| ApplyError::Update {
            child: child.clone(),
            source,
        })?;
    info!(%child, "updated child");
    Ok(ApplyOutcome::Updated)
}

/// Remove a child the spec no longer wants. Missing is fine, and objects
/// without `owner` as their controller are left alone.
pub async fn decommission(
    store: &dyn ChildStore,
    owner: &OwnerReference,
    child: &ChildRef,
) -> Result<ApplyOutcome, ApplyError> {
    let existing = store.get(child).await.map_err(|source| ApplyError::Get {
        child: child.clone(),
        source,
    })?;
    let Some(live) = existing else {
        return Ok(ApplyOutcome::Absent);
    };
    if !is_controlled_by(live.meta(), owner) {
        warn!(%child, "not controlled by this cluster; leaving it in place");
        return Ok(ApplyOutcome::Foreign);
    }
    match store.delete(child).await {
        Ok(()) => {
            info!(%child, "deleted decommissioned child");
            Ok(ApplyOutcome::Deleted)
        }
        Err(e) if e.is_not_found() => Ok(ApplyOutcome::Absent),
        Err(source) => Err(ApplyError::Delete {
            child: child.clone(),
            source,
        }),
    }
}

/// Copy platform-assigned fields from the live object so a replace does not
/// clobber them.
pub fn carry_forward(live: &ChildManifest, desired: &mut ChildManifest) {
    let live_meta = live.meta();
    {
        let meta = desired.meta_mut();
        meta.resource_version = live_meta.resource_version.clone();
        if meta.owner_references.is_none() {
            meta.owner_references = live_meta.owner_references.clone();
        }
    }
    if let (ChildManifest::Service(live), ChildManifest::Service(desired)) = (live, desired) {
        if let (Some(live_spec), Some(spec)) = (live.spec.as_ref(), desired.spec.as_mut()) {
            spec.cluster_ip = live_spec.cluster_ip.clone();
            spec.cluster_ips = live_spec.cluster_ips.clone();
        }
    }
}

/// Upsert `owner` into the owner references, keyed by uid.
pub fn set_owner_reference(meta: &mut ObjectMeta, owner: &OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner.clone(),
        None => refs.push(owner.clone()),
    }
}

fn is_controlled_by(meta: &ObjectMeta, owner: &OwnerReference) -> bool {
    meta.owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == owner.uid && r.controller == Some(true)))
}

/// Field-scoped drift check over the fields this operator manages.
pub fn needs_update(
    live: &ChildManifest,
    desired: &ChildManifest,
    owner: &OwnerReference,
) -> bool {
    if !is_controlled_by(live.meta(), owner) {
        return true;
    }
    let version = |m: &ChildManifest| {
        m.meta()
            .labels
            .as_ref()
            .and_then(|l| l.get(LABEL_VERSION).cloned())
    };
    if version(live) != version(desired) {
        return true;
    }
    match (live, desired) {
        (ChildManifest::Deployment(l), ChildManifest::Deployment(d)) => {
            deployment_differs(l, d)
        }
        (ChildManifest::Service(l), ChildManifest::Service(d)) => service_differs(l, d),
        _ => true,
    }
}

fn first_container(d: &Deployment) -> Option<&Container> {
    d.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
}

fn deployment_differs(live: &Deployment, desired: &Deployment) -> bool {
    let replicas = |d: &Deployment| d.spec.as_ref().and_then(|s| s.replicas);
    match (replicas(live), replicas(desired)) {
        (Some(l), Some(d)) if l == d => {}
        _ => return true,
    }

    let (Some(lc), Some(dc)) = (first_container(live), first_container(desired)) else {
        return true;
    };
    if lc.image != dc.image {
        return true;
    }
    let ports = |c: &Container| -> Vec<(Option<String>, i32)> {
        c.ports
            .iter()
            .flatten()
            .map(|p| (p.name.clone(), p.container_port))
            .collect()
    };
    ports(lc) != ports(dc)
}

fn service_differs(live: &Service, desired: &Service) -> bool {
    let ports = |s: &Service| {
        s.spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| (p.name.clone(), p.port, p.target_port.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    };
    ports(live) != ports(desired)
}
