use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use super::apply::{self, ApplyError, ApplyOutcome};
use super::conditions::{has_any, set_condition, timestamp};
use super::status::should_publish;
use super::store::ChildStore;
use super::{ClusterContext, ReconcileKey};
use crate::builder::{self, ChildRef};
use crate::crd::bss_cluster::{ClusterPhase, ResourceRef};
use crate::crd::condition::{
    REASON_INVALID_CONFIG, REASON_RECONCILE_FAILED, REASON_RECONCILE_SUCCESS,
    REASON_RECONCILING,
};
use crate::crd::{BssCluster, BssClusterStatus, ConditionStatus, ConditionType, StatusCarrier};
use crate::dispatcher::Requeue;
use crate::error::ReconcileError;
use crate::validation::Validate;

const READY_MESSAGE: &str = "All child resources converged";

/// One convergence pass for a BssCluster.
///
/// Success relies on watch-driven re-entry and never asks for a timed
/// requeue. Failures are published to status before the error is returned.
#[instrument(skip_all, fields(ns = %key.namespace, name = %key.name))]
pub async fn reconcile_cluster(
    key: ReconcileKey,
    ctx: Arc<ClusterContext>,
) -> Result<Requeue, ReconcileError> {
    let Some(mut cluster) = ctx
        .entities
        .get(&key)
        .await
        .map_err(|source| ReconcileError::Fetch {
            key: key.clone(),
            source,
        })?
    else {
        debug!("BssCluster not found; nothing to do");
        return Ok(Requeue::AwaitChange);
    };
    if cluster.metadata.deletion_timestamp.is_some() {
        debug!("BssCluster is being deleted; children follow via owner references");
        return Ok(Requeue::AwaitChange);
    }
    info!(generation = ?cluster.metadata.generation, "reconciling BssCluster");

    let now = Utc::now();
    if !has_any(cluster.conditions()) {
        let st = cluster.status_mut();
        set_condition(
            &mut st.conditions,
            ConditionType::Available,
            ConditionStatus::Unknown,
            REASON_RECONCILING,
            "Starting reconciliation",
            &now,
        );
        st.phase = Some(ClusterPhase::Reconciling.to_string());
        st.message = Some("Starting reconciliation".into());
        cluster = ctx
            .entities
            .publish_status(&cluster)
            .await
            .map_err(ReconcileError::StatusWrite)?;
    }
    let published = cluster.status().cloned();

    if let Err(err) = cluster.spec.validate() {
        warn!(error = %err, "invalid BssCluster spec");
        mark_failed(cluster.status_mut(), REASON_INVALID_CONFIG, &err.to_string(), &now);
        publish_if_changed(&ctx, &cluster, published.as_ref()).await?;
        return Err(ReconcileError::Validation(err));
    }

    match converge(ctx.children.as_ref(), &cluster).await {
        Ok(applied) => {
            let generation = cluster.metadata.generation;
            let st = cluster.status_mut();
            set_condition(
                &mut st.conditions,
                ConditionType::Available,
                ConditionStatus::True,
                REASON_RECONCILE_SUCCESS,
                READY_MESSAGE,
                &now,
            );
            set_condition(
                &mut st.conditions,
                ConditionType::Degraded,
                ConditionStatus::False,
                REASON_RECONCILE_SUCCESS,
                READY_MESSAGE,
                &now,
            );
            st.phase = Some(ClusterPhase::Ready.to_string());
            st.message = Some(READY_MESSAGE.into());
            st.observed_generation = st.observed_generation.max(generation);
            st.last_reconcile_time = Some(timestamp(&now));
            st.resource_refs = applied
                .iter()
                .map(|c| ResourceRef {
                    kind: c.kind.to_string(),
                    name: c.name.clone(),
                })
                .collect();
            publish_if_changed(&ctx, &cluster, published.as_ref()).await?;
            info!(children = applied.len(), "BssCluster ready");
            Ok(Requeue::AwaitChange)
        }
        Err(err) => {
            warn!(error = %err, "failed to converge children");
            mark_failed(cluster.status_mut(), REASON_RECONCILE_FAILED, &err.to_string(), &now);
            publish_if_changed(&ctx, &cluster, published.as_ref()).await?;
            Err(ReconcileError::Apply(err))
        }
    }
}

/// Converge desired children in dependency order, then decommission the
/// ones the spec dropped. Returns the children that now exist.
async fn converge(
    store: &dyn ChildStore,
    cluster: &BssCluster,
) -> Result<Vec<ChildRef>, ApplyError> {
    let owner = apply::owner_reference(cluster)?;
    let mut present = Vec::new();
    for desired in builder::build_children(cluster) {
        let child = desired.child_ref();
        let outcome = apply::reconcile_child(store, &owner, desired).await?;
        debug!(%child, ?outcome, "child converged");
        present.push(child);
    }
    for child in builder::decommissioned(cluster) {
        let outcome = apply::decommission(store, &owner, &child).await?;
        if outcome == ApplyOutcome::Deleted {
            info!(%child, "decommissioned child");
        }
    }
    Ok(present)
}

fn mark_failed(
    st: &mut BssClusterStatus,
    reason: &str,
    message: &str,
    now: &DateTime<Utc>,
) {
    set_condition(
        &mut st.conditions,
        ConditionType::Available,
        ConditionStatus::False,
        reason,
        message,
        now,
    );
    set_condition(
        &mut st.conditions,
        ConditionType::Degraded,
        ConditionStatus::True,
        reason,
        message,
        now,
    );
    st.phase = Some(ClusterPhase::Failed.to_string());
    st.message = Some(message.to_string());
}

async fn publish_if_changed(
    ctx: &ClusterContext,
    cluster: &BssCluster,
    published: Option<&BssClusterStatus>,
) -> Result<(), ReconcileError> {
    let Some(desired) = cluster.status() else {
        return Ok(());
    };
    if !should_publish(published, desired) {
        return Ok(());
    }
    ctx.entities
        .publish_status(cluster)
        .await
        .map_err(ReconcileError::StatusWrite)?;
    debug!(name = %cluster.name_any(), "status published");
    Ok(())
}
