pub mod bss_cluster;
pub mod bss_query;
pub mod condition;

pub use bss_cluster::{BssCluster, BssClusterSpec, BssClusterStatus};
pub use bss_query::{BssQuery, BssQuerySpec, BssQueryStatus, QueryKind};
pub use condition::{Condition, ConditionStatus, ConditionType};

pub const API_GROUP: &str = "bss.localhost";
pub const API_VERSION: &str = "bss.localhost/v1alpha1";

/// Access to the controller-owned status block of a managed entity.
pub trait StatusCarrier {
    type Status: serde::Serialize + Default + Clone + Send + Sync;

    fn status(&self) -> Option<&Self::Status>;
    fn status_mut(&mut self) -> &mut Self::Status;
    fn conditions(&self) -> &[Condition];
}

impl StatusCarrier for BssCluster {
    type Status = BssClusterStatus;

    fn status(&self) -> Option<&BssClusterStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut BssClusterStatus {
        self.status.get_or_insert_with(Default::default)
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or(&[])
    }
}

impl StatusCarrier for BssQuery {
    type Status = BssQueryStatus;

    fn status(&self) -> Option<&BssQueryStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut BssQueryStatus {
        self.status.get_or_insert_with(Default::default)
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or(&[])
    }
}
