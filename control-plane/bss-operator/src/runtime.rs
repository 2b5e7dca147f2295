use std::net::SocketAddr;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use kube::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::OperatorConfig,
    controller::{run_cluster_controller, run_query_controller},
    web::run_http_server,
};

/// Compute the HTTP bind address based on config.
pub fn compute_http_addr(cfg: &OperatorConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.http_port).into()
}

/// Spawn the BssCluster controller loop.
pub fn spawn_cluster_controller(
    client: Client,
    cfg: OperatorConfig,
    shutdown: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(
        async move { run_cluster_controller(client, cfg, shutdown).await },
    )
}

/// Spawn the BssQuery controller loop.
pub fn spawn_query_controller(
    client: Client,
    cfg: OperatorConfig,
    shutdown: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(
        async move { run_query_controller(client, cfg, shutdown).await },
    )
}

/// Start the enabled controllers plus the health endpoint and wait until a
/// shutdown signal arrives or any of them stops.
pub async fn run_all(client: Client, cfg: OperatorConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let http_addr = compute_http_addr(&cfg);

    let mut handles: Vec<JoinHandle<anyhow::Result<()>>> = Vec::new();
    if cfg.features.cluster {
        handles.push(spawn_cluster_controller(
            client.clone(),
            cfg.clone(),
            shutdown.clone(),
        ));
    }
    if cfg.features.query {
        handles.push(spawn_query_controller(
            client.clone(),
            cfg.clone(),
            shutdown.clone(),
        ));
    }
    if handles.is_empty() {
        warn!("no controllers enabled; only serving health endpoints");
    }
    let http_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        run_http_server(http_addr, http_shutdown).await
    }));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        signal_token.cancel();
    });

    supervise(handles, shutdown).await
}

/// Await all components as they finish. The first failure cancels
/// `shutdown` and the rest are drained before returning that error.
pub async fn supervise(
    handles: Vec<JoinHandle<anyhow::Result<()>>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut pending: FuturesUnordered<_> = handles.into_iter().collect();
    let mut first_err: Option<anyhow::Error> = None;
    while let Some(joined) = pending.next().await {
        let res = match joined {
            Ok(res) => res,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = res {
            if first_err.is_none() {
                error!(error = %e, "component failed; shutting down");
                shutdown.cancel();
                first_err = Some(e);
            } else {
                warn!(error = %e, "component failed during shutdown");
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
