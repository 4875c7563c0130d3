//! # Workers
//!
//! A fixed pool of tasks that pop Work keys, reconcile them under a
//! timeout, and schedule the next pass.

use crate::controller::priority::{Priority, PriorityQueue};
use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::crd::WorkKey;
use crate::observability::metrics;
use crate::runtime::error_policy::ErrorPolicy;
use crate::runtime::requeue::DelayedRequeue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything a worker needs
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub reconciler: Arc<Reconciler>,
    pub queue: Arc<dyn PriorityQueue>,
    pub requeue: Arc<DelayedRequeue>,
    pub error_policy: Arc<ErrorPolicy>,
    pub reconcile_timeout: Duration,
    pub shutdown: CancellationToken,
}

/// Start `count` workers; they exit once the queue is shut down
pub fn spawn_workers(count: usize, ctx: &WorkerContext) -> JoinSet<()> {
    let mut workers = JoinSet::new();
    for id in 0..count.max(1) {
        let ctx = ctx.clone();
        workers.spawn(async move { run_worker(id, ctx).await });
    }
    info!("Started {} reconciliation workers", count.max(1));
    workers
}

async fn run_worker(id: usize, ctx: WorkerContext) {
    while let Some(key) = ctx.queue.pop().await {
        process_key(&ctx, &key).await;
        ctx.queue.done(&key);
        for (priority, depth) in ctx.queue.depth_by_priority() {
            metrics::set_queue_depth(priority.as_str(), depth);
        }
    }
    debug!(worker = id, "Queue shut down, worker exiting");
}

async fn process_key(ctx: &WorkerContext, key: &WorkKey) {
    let outcome = tokio::select! {
        () = ctx.shutdown.cancelled() => return,
        result = tokio::time::timeout(ctx.reconcile_timeout, reconcile(&ctx.reconciler, key)) => {
            result.unwrap_or(Err(ReconcilerError::Timeout(ctx.reconcile_timeout)))
        }
    };

    match outcome {
        Ok(outcome) => {
            ctx.error_policy.on_success(key);
            match outcome.requeue_after {
                Some(after) => ctx.requeue.schedule(key.clone(), Priority::Default, after),
                None => ctx.requeue.cancel(key),
            }
        }
        Err(e) => {
            let after = ctx.error_policy.on_error(key, &e);
            ctx.requeue.schedule(key.clone(), Priority::Default, after);
        }
    }
}
