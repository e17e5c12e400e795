//! Service entry point: environment, database bootstrap, stage loop, RPC
//! server, and signal-driven shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use concord_controller::broker::JsonRpcBroker;
use concord_controller::config::Config;
use concord_controller::controller::Controller;
use concord_controller::model::{Resource, Task, TaskStat};
use concord_controller::rpc::{self, ApiV1};
use concord_controller::store::{ArangoClient, Collection};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("reading environment")?;

    let db = ArangoClient::connect(&config.database)
        .await
        .context("connecting to the database")?;
    let task_store = Arc::new(db.collection::<Task>());
    let resource_store = Arc::new(db.collection::<Resource>());
    let stat_store = Arc::new(db.collection::<TaskStat>());
    task_store.create().await.context("ensuring tasks collection")?;
    resource_store
        .create()
        .await
        .context("ensuring resources collection")?;
    stat_store
        .create()
        .await
        .context("ensuring task_stats collection")?;

    let broker = Arc::new(JsonRpcBroker::new().context("building the service broker")?);
    let ctrl = Controller::new(
        config.hosts.clone(),
        broker,
        task_store,
        resource_store,
        stat_store,
    );
    ctrl.restore().await.context("restoring controller state")?;

    let token = CancellationToken::new();
    let stage_loop = ctrl.clone().spawn_stage_loop(token.clone());

    let signal_token = token.clone();
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_ok() {
            info!("shutdown signal received");
        }
        signal_token.cancel();
    });

    let api = Arc::new(ApiV1::new(ctrl));
    rpc::serve(config.bind_addr, api, token).await.context("serving rpc")?;

    let _ = stage_loop.await;
    info!("controller stopped");
    Ok(())
}

/// Completes when the process receives a termination signal.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
