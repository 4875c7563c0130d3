//! # Runtime
//!
//! Agent startup and the long-running tasks: the Work watch, the worker
//! pool and delayed requeues.

pub mod error_policy;
pub mod initialization;
pub mod requeue;
pub mod watch_loop;
pub mod workers;

use crate::controller::priority::{KeyedPriorityQueue, PriorityEventHandler, PriorityQueue};
use crate::crd::Work;
use anyhow::Result;
use error_policy::ErrorPolicy;
use initialization::initialize;
use kube::api::Api;
use requeue::DelayedRequeue;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use watch_loop::run_watch_loop;
use workers::{spawn_workers, WorkerContext};

/// Run the agent until SIGINT/SIGTERM
pub async fn run() -> Result<()> {
    let shutdown = CancellationToken::new();
    let init = initialize(shutdown.clone()).await?;

    let queue: Arc<dyn PriorityQueue> = Arc::new(KeyedPriorityQueue::new());
    let handler = Arc::new(PriorityEventHandler::new(
        Arc::clone(&queue),
        init.config.fresh_work_threshold(),
    ));
    let ctx = WorkerContext {
        reconciler: Arc::clone(&init.reconciler),
        queue: Arc::clone(&queue),
        requeue: DelayedRequeue::new(Arc::clone(&queue), shutdown.clone()),
        error_policy: Arc::new(ErrorPolicy::new()),
        reconcile_timeout: init.config.reconcile_timeout(),
        shutdown: shutdown.clone(),
    };
    let mut workers = spawn_workers(init.config.workers, &ctx);

    let signal_token = shutdown.clone();
    let signal_state = Arc::clone(&init.server_state);
    let signal_queue = Arc::clone(&queue);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        signal_state.is_ready.store(false, Ordering::Relaxed);
        signal_queue.shut_down();
        signal_token.cancel();
    });

    let works: Api<Work> = Api::namespaced(init.hub.clone(), &init.config.hub_namespace);
    run_watch_loop(
        works,
        handler,
        Arc::clone(&init.server_state),
        init.config.watch_restart_delay(),
        shutdown.clone(),
    )
    .await;

    queue.shut_down();
    while workers.join_next().await.is_some() {}
    info!("Fleet work applier stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
