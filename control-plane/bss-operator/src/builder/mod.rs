//! Pure mapping from a `BssCluster` spec to its ordered child manifests.

pub mod labels;

use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort,
    ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::BssCluster;

pub const CONTAINER_NAME: &str = "bss";
pub const PORT_NAME: &str = "http";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKind {
    Service,
    Deployment,
}

impl ChildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::Service => "Service",
            ChildKind::Deployment => "Deployment",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a child resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildRef {
    pub kind: ChildKind,
    pub namespace: String,
    pub name: String,
}

impl ChildRef {
    pub fn new(
        kind: ChildKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A desired or live child object.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildManifest {
    Service(Service),
    Deployment(Deployment),
}

impl ChildManifest {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildManifest::Service(_) => ChildKind::Service,
            ChildManifest::Deployment(_) => ChildKind::Deployment,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ChildManifest::Service(s) => &s.metadata,
            ChildManifest::Deployment(d) => &d.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ChildManifest::Service(s) => &mut s.metadata,
            ChildManifest::Deployment(d) => &mut d.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    pub fn child_ref(&self) -> ChildRef {
        ChildRef::new(self.kind(), self.namespace(), self.name())
    }
}

/// Desired children in dependency order: the Service (when exposed) comes
/// before the Deployment that binds to it.
pub fn build_children(cluster: &BssCluster) -> Vec<ChildManifest> {
    let mut out = Vec::with_capacity(2);
    if cluster.spec.exposed() {
        out.push(ChildManifest::Service(build_service(cluster)));
    }
    out.push(ChildManifest::Deployment(build_deployment(cluster)));
    out
}

/// Children this operator may have created earlier but the current spec no
/// longer wants.
pub fn decommissioned(cluster: &BssCluster) -> Vec<ChildRef> {
    if cluster.spec.exposed() {
        Vec::new()
    } else {
        vec![ChildRef::new(
            ChildKind::Service,
            cluster.namespace().unwrap_or_default(),
            cluster.name_any(),
        )]
    }
}

fn child_meta(cluster: &BssCluster) -> ObjectMeta {
    let name = cluster.name_any();
    ObjectMeta {
        name: Some(name.clone()),
        namespace: cluster.namespace(),
        labels: Some(labels::common_labels(
            &name,
            cluster.spec.version.as_deref(),
        )),
        ..Default::default()
    }
}

pub fn build_deployment(cluster: &BssCluster) -> Deployment {
    let name = cluster.name_any();
    let selector = labels::selector_labels(&name);
    let pod_labels = labels::common_labels(&name, cluster.spec.version.as_deref());

    Deployment {
        metadata: child_meta(cluster),
        spec: Some(DeploymentSpec {
            replicas: Some(cluster.spec.replicas_or_default()),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(cluster.spec.image.clone()),
                        ports: Some(vec![ContainerPort {
                            name: Some(PORT_NAME.to_string()),
                            container_port: cluster.spec.port_or_default(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_service(cluster: &BssCluster) -> Service {
    let name = cluster.name_any();
    let port = cluster.spec.port_or_default();

    Service {
        metadata: child_meta(cluster),
        spec: Some(ServiceSpec {
            selector: Some(labels::selector_labels(&name)),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
