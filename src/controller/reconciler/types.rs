//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::apply::MemberClient;
use crate::controller::associations::{AssociationError, NamespaceAssociationTracker};
use crate::controller::ratelimiter::BackoffRateLimiter;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Namespace association update failed: {0}")]
    Association(#[from] AssociationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Reconciliation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// What the worker should do with the key after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    /// Nothing left to do until the next event
    #[must_use]
    pub fn done() -> Self {
        Self {
            requeue_after: None,
        }
    }

    #[must_use]
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Shared state for reconciling the Works of one member cluster
#[derive(Clone)]
pub struct Reconciler {
    /// Hub cluster: Work objects and member records
    pub hub: Client,
    /// Member cluster: AppliedWork objects
    pub member: Client,
    /// Member cluster: applied manifests
    pub member_client: Arc<dyn MemberClient>,
    pub rate_limiter: Arc<BackoffRateLimiter>,
    pub associations: Arc<NamespaceAssociationTracker>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("rate_limiter", &self.rate_limiter)
            .field("associations", &self.associations)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        hub: Client,
        member: Client,
        member_client: Arc<dyn MemberClient>,
        associations: Arc<NamespaceAssociationTracker>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            hub,
            member,
            member_client,
            rate_limiter: Arc::new(BackoffRateLimiter::from_config(config)),
            associations,
        }
    }
}
