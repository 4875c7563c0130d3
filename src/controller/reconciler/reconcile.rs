//! # Reconcile
//!
//! One end-to-end pass over a single Work.

use crate::controller::associations::succeeded_namespaces;
use crate::controller::processor::process_manifests;
use crate::controller::reconciler::cleanup::{
    ensure_finalizer, finalize, release_leftovers, released_namespaces,
};
use crate::controller::reconciler::status::{
    ensure_applied_work, update_applied_work_status, update_work_status,
};
use crate::controller::reconciler::types::{ReconcileOutcome, Reconciler, ReconcilerError};
use crate::crd::{Work, WorkKey};
use crate::observability::metrics;
use anyhow::anyhow;
use kube::api::Api;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

/// Reconcile the Work identified by `key`
///
/// Returns how long to wait before the next pass. API errors propagate to
/// the caller's error policy.
pub async fn reconcile(ctx: &Reconciler, key: &WorkKey) -> Result<ReconcileOutcome, ReconcilerError> {
    let works: Api<Work> = Api::namespaced(ctx.hub.clone(), &key.namespace);
    let Some(work) = works.get_opt(&key.name).await? else {
        debug!(work = %key, "Work no longer exists, forgetting it");
        ctx.rate_limiter.forget(key);
        return Ok(ReconcileOutcome::done());
    };

    let span = info_span!(
        "work.reconcile",
        work.namespace = key.namespace.as_str(),
        work.name = key.name.as_str(),
        work.generation = work.metadata.generation.unwrap_or(0)
    );
    async move {
        let start = Instant::now();
        metrics::increment_reconciliations();
        let outcome = reconcile_work(ctx, &works, &work).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        outcome
    }
    .instrument(span)
    .await
}

async fn reconcile_work(
    ctx: &Reconciler,
    works: &Api<Work>,
    work: &Work,
) -> Result<ReconcileOutcome, ReconcilerError> {
    if work.metadata.deletion_timestamp.is_some() {
        finalize(ctx, works, work).await?;
        return Ok(ReconcileOutcome::done());
    }
    ensure_finalizer(works, work).await?;

    let applied_work = ensure_applied_work(ctx, work).await?;
    let owner = applied_work.owner_reference().ok_or_else(|| {
        anyhow!(
            "AppliedWork {} has no UID",
            applied_work.metadata.name.as_deref().unwrap_or_default()
        )
    })?;

    let bundles = process_manifests(ctx.member_client.as_ref(), work, &owner).await;
    for bundle in &bundles {
        metrics::increment_manifests_processed(bundle.apply_result.as_str());
    }

    if work.apply_strategy().r#type.is_enforcing() {
        let previous = applied_work
            .status
            .as_ref()
            .map(|s| s.applied_resources.clone())
            .unwrap_or_default();
        let sweep =
            release_leftovers(ctx.member_client.as_ref(), &owner, &previous, &bundles).await;
        update_applied_work_status(ctx, &applied_work, sweep.tracked).await?;
        let released = released_namespaces(&sweep.released);
        if !released.is_empty() {
            ctx.associations.remove_associations(work, &released).await?;
        }
    }

    update_work_status(works, work, &bundles).await?;
    ctx.associations
        .update_associations(work, &succeeded_namespaces(&bundles))
        .await?;

    let delay = ctx.rate_limiter.when(work, &bundles);
    metrics::observe_requeue_delay(delay.as_secs_f64());
    info!(
        manifests = bundles.len(),
        applied = bundles.iter().filter(|b| b.apply_result.is_applied()).count(),
        requeue_secs = delay.as_secs_f64(),
        "Reconciled Work"
    );
    Ok(ReconcileOutcome::requeue(delay))
}
