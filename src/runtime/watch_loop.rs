//! # Watch Loop
//!
//! Watches Work objects in the member's hub namespace and turns watcher
//! events into create/update/delete/generic notifications for the priority
//! event handler.

use crate::controller::priority::{PriorityEventHandler, WorkEvent};
use crate::controller::server::ServerState;
use crate::crd::{Work, WorkKey};
use crate::runtime::error_policy::handle_watch_stream_error;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Last observed copy of every known Work
///
/// Lets an apply event be told apart as a create or an update, and detects
/// Works that disappeared while the watch was down.
#[derive(Debug, Default)]
pub struct WorkCache {
    works: HashMap<WorkKey, Work>,
    relisting: Option<HashSet<WorkKey>>,
    synced: bool,
}

impl WorkCache {
    /// Translate one watcher event
    pub fn observe(&mut self, event: watcher::Event<Work>) -> Vec<WorkEvent> {
        match event {
            watcher::Event::Apply(work) => {
                let key = work.key();
                match self.works.insert(key, work.clone()) {
                    Some(old) => vec![WorkEvent::Updated {
                        old: Box::new(old),
                        new: Box::new(work),
                    }],
                    None => vec![WorkEvent::Created(work)],
                }
            }
            watcher::Event::Delete(work) => {
                self.works.remove(&work.key());
                vec![WorkEvent::Deleted(work)]
            }
            watcher::Event::Init => {
                self.relisting = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(work) => {
                let key = work.key();
                if let Some(seen) = self.relisting.as_mut() {
                    seen.insert(key.clone());
                }
                match self.works.insert(key, work.clone()) {
                    Some(_) => vec![WorkEvent::Generic(work)],
                    None => vec![WorkEvent::Created(work)],
                }
            }
            watcher::Event::InitDone => {
                self.synced = true;
                let Some(seen) = self.relisting.take() else {
                    return Vec::new();
                };
                let gone: Vec<WorkKey> = self
                    .works
                    .keys()
                    .filter(|k| !seen.contains(*k))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|k| self.works.remove(&k))
                    .map(WorkEvent::Deleted)
                    .collect()
            }
        }
    }

    /// Whether the initial list has completed
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.works.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }
}

/// Run the Work watch until `shutdown` is cancelled
///
/// The watch is restarted after `restart_delay` whenever its stream ends.
pub async fn run_watch_loop(
    works: Api<Work>,
    handler: Arc<PriorityEventHandler>,
    server_state: Arc<ServerState>,
    restart_delay: Duration,
    shutdown: CancellationToken,
) {
    let mut cache = WorkCache::default();

    loop {
        if shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );
        info!("Starting Work watch...");
        let mut stream = watcher(works.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();

        let cancelled = async {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => return true,
                    next = stream.next() => match next {
                        Some(Ok(event)) => {
                            for work_event in cache.observe(event) {
                                handler.handle(&work_event);
                            }
                            if cache.is_synced() && !server_state.is_ready.swap(true, Ordering::Relaxed) {
                                info!(works = cache.len(), "Initial Work list synced, marking ready");
                            }
                        }
                        Some(Err(e)) => handle_watch_stream_error(&e),
                        None => return false,
                    },
                }
            }
        }
        .instrument(watch_span)
        .await;

        if cancelled {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Work watch stream ended, restarting in {}s...",
            restart_delay.as_secs()
        );
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(restart_delay) => debug!("Restarting Work watch"),
        }
    }
}
