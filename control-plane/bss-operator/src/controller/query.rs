use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::conditions::{has_any, set_condition, timestamp};
use super::{QueryContext, ReconcileKey};
use crate::config::RefreshSettings;
use crate::crd::condition::{
    REASON_INVALID_CONFIG, REASON_QUERY_FAILED, REASON_QUERY_SUCCESS, REASON_RECONCILING,
};
use crate::crd::{BssQuery, BssQuerySpec, ConditionStatus, ConditionType, QueryKind, StatusCarrier};
use crate::dispatcher::Requeue;
use crate::error::ReconcileError;
use crate::query_client::{ClusterQuery, QueryError};
use crate::validation::Validate;

const SUCCESS_MESSAGE: &str = "Query executed successfully";

/// What to ask the inventory service for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Single(String),
    All,
}

impl QueryPlan {
    pub fn from_spec(spec: &BssQuerySpec) -> Self {
        match spec.query {
            QueryKind::Cluster => QueryPlan::Single(spec.cluster_id.clone().unwrap_or_default()),
            QueryKind::Clusters => QueryPlan::All,
        }
    }
}

/// Serialized result plus the number of records in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub json: String,
    pub count: i64,
}

/// Periodic requeue interval, re-read from the spec on every pass.
pub fn refresh_interval(spec: &BssQuerySpec, settings: &RefreshSettings) -> Duration {
    match spec.refresh_interval {
        Some(secs) if secs > 0 => Duration::from_secs(secs as u64).max(settings.min_refresh),
        _ => settings.default_refresh,
    }
}

/// Run `plan`. An empty single lookup is an error, not an empty result.
pub async fn execute_plan(
    client: &dyn ClusterQuery,
    plan: &QueryPlan,
) -> Result<QueryOutcome, QueryError> {
    match plan {
        QueryPlan::Single(id) => {
            let record = client
                .get_cluster(id)
                .await?
                .ok_or_else(|| QueryError::NotFound(id.clone()))?;
            Ok(QueryOutcome {
                json: serde_json::to_string(&record)?,
                count: 1,
            })
        }
        QueryPlan::All => {
            let records = client.list_clusters().await?;
            Ok(QueryOutcome {
                json: serde_json::to_string(&records)?,
                count: records.len() as i64,
            })
        }
    }
}

/// One query pass for a BssQuery. Success always publishes status and
/// schedules the next refresh.
#[instrument(skip_all, fields(ns = %key.namespace, name = %key.name))]
pub async fn reconcile_query(
    key: ReconcileKey,
    ctx: Arc<QueryContext>,
) -> Result<Requeue, ReconcileError> {
    let Some(mut query) = ctx
        .entities
        .get(&key)
        .await
        .map_err(|source| ReconcileError::Fetch {
            key: key.clone(),
            source,
        })?
    else {
        debug!("BssQuery not found; nothing to do");
        return Ok(Requeue::AwaitChange);
    };
    if query.metadata.deletion_timestamp.is_some() {
        return Ok(Requeue::AwaitChange);
    }
    info!(query = %query.spec.query, "reconciling BssQuery");

    if !has_any(query.conditions()) {
        set_condition(
            &mut query.status_mut().conditions,
            ConditionType::Available,
            ConditionStatus::Unknown,
            REASON_RECONCILING,
            "Starting reconciliation",
            &Utc::now(),
        );
        query = publish(&ctx, &query).await?;
    }

    if let Err(err) = query.spec.validate() {
        warn!(error = %err, "invalid BssQuery spec");
        set_condition(
            &mut query.status_mut().conditions,
            ConditionType::Degraded,
            ConditionStatus::True,
            REASON_INVALID_CONFIG,
            err.to_string(),
            &Utc::now(),
        );
        publish(&ctx, &query).await?;
        return Err(ReconcileError::Validation(err));
    }

    let interval = refresh_interval(&query.spec, &ctx.refresh);
    let plan = QueryPlan::from_spec(&query.spec);
    let result = match ctx.queries.client_for(&query.spec.api_endpoint) {
        Ok(client) => execute_plan(client.as_ref(), &plan).await,
        Err(e) => Err(e),
    };

    let now = Utc::now();
    match result {
        Ok(outcome) => {
            let generation = query.metadata.generation;
            let st = query.status_mut();
            st.result = Some(outcome.json);
            st.cluster_count = Some(outcome.count);
            set_condition(
                &mut st.conditions,
                ConditionType::Available,
                ConditionStatus::True,
                REASON_QUERY_SUCCESS,
                SUCCESS_MESSAGE,
                &now,
            );
            set_condition(
                &mut st.conditions,
                ConditionType::Degraded,
                ConditionStatus::False,
                REASON_QUERY_SUCCESS,
                SUCCESS_MESSAGE,
                &now,
            );
            st.observed_generation = st.observed_generation.max(generation);
            st.last_query_time = Some(timestamp(&now));
            publish(&ctx, &query).await?;
            info!(count = outcome.count, requeue_after = ?interval, "BssQuery refreshed");
            Ok(Requeue::After(interval))
        }
        Err(err) => {
            warn!(error = %err, "query failed");
            set_condition(
                &mut query.status_mut().conditions,
                ConditionType::Degraded,
                ConditionStatus::True,
                REASON_QUERY_FAILED,
                format!("Query failed: {err}"),
                &now,
            );
            publish(&ctx, &query).await?;
            Err(ReconcileError::Query {
                source: err,
                retry_after: interval,
            })
        }
    }
}

async fn publish(ctx: &QueryContext, query: &BssQuery) -> Result<BssQuery, ReconcileError> {
    ctx.entities
        .publish_status(query)
        .await
        .map_err(ReconcileError::StatusWrite)
}
