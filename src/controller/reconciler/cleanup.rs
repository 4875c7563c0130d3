//! # Cleanup
//!
//! Finalizer handling and release of objects a Work no longer lists.
//!
//! An object is released by dropping the AppliedWork owner reference. When
//! that reference is the only owner the object is deleted instead.

use crate::constants::{DEFAULT_NAMESPACE, WORK_FINALIZER};
use crate::controller::apply::{is_owned_by, ApplyError, MemberClient};
use crate::controller::associations::namespaces_from_manifests;
use crate::controller::processor::results::ApplyResultType;
use crate::controller::processor::{applied_resources, ManifestProcessingBundle};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{AppliedResourceMeta, AppliedWork, Work};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Result of a left-over sweep
#[derive(Debug, Default)]
pub struct LeftoverSweep {
    /// Entries the AppliedWork keeps tracking
    pub tracked: Vec<AppliedResourceMeta>,
    /// Entries released from the member cluster in this sweep
    pub released: Vec<AppliedResourceMeta>,
}

/// Add the cleanup finalizer if missing
pub async fn ensure_finalizer(works: &Api<Work>, work: &Work) -> Result<(), ReconcilerError> {
    let finalizers = work.metadata.finalizers.clone().unwrap_or_default();
    if finalizers.iter().any(|f| f == WORK_FINALIZER) {
        return Ok(());
    }

    let mut next = finalizers;
    next.push(WORK_FINALIZER.to_string());
    patch_finalizers(works, work, next).await?;
    debug!("Added Work finalizer");
    Ok(())
}

/// Clean up after a Work marked for deletion and release its finalizer
///
/// Deleting the AppliedWork hands the applied objects to the member's
/// garbage collector.
pub async fn finalize(ctx: &Reconciler, works: &Api<Work>, work: &Work) -> Result<(), ReconcilerError> {
    let finalizers = work.metadata.finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|f| f == WORK_FINALIZER) {
        return Ok(());
    }
    let name = work.metadata.name.as_deref().unwrap_or_default();

    let applied_works: Api<AppliedWork> = Api::all(ctx.member.clone());
    match applied_works.delete(name, &DeleteParams::background()).await {
        Ok(_) => info!(applied_work = name, "Deleted AppliedWork"),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
            debug!(applied_work = name, "AppliedWork already gone");
        }
        Err(e) => return Err(e.into()),
    }

    let namespaces = namespaces_from_manifests(&work.spec.workload.manifests);
    ctx.associations.remove_associations(work, &namespaces).await?;
    ctx.rate_limiter.forget(&work.key());

    let remaining = finalizers
        .into_iter()
        .filter(|f| f != WORK_FINALIZER)
        .collect();
    patch_finalizers(works, work, remaining).await?;
    info!("Finalized deleted Work");
    Ok(())
}

async fn patch_finalizers(
    works: &Api<Work>,
    work: &Work,
    finalizers: Vec<String>,
) -> Result<(), ReconcilerError> {
    let mut metadata = json!({ "finalizers": finalizers });
    if let Some(rv) = &work.metadata.resource_version {
        metadata["resourceVersion"] = json!(rv);
    }
    works
        .patch(
            work.metadata.name.as_deref().unwrap_or_default(),
            &PatchParams::default(),
            &Patch::Merge(json!({ "metadata": metadata })),
        )
        .await?;
    Ok(())
}

/// Release objects recorded in `previous` that the Work no longer lists
///
/// Entries whose manifest is still present stay tracked even when this pass
/// failed to apply them. A release that fails keeps its entry so the next
/// pass retries it.
pub async fn release_leftovers(
    client: &dyn MemberClient,
    owner: &OwnerReference,
    previous: &[AppliedResourceMeta],
    bundles: &[ManifestProcessingBundle],
) -> LeftoverSweep {
    let applied_uids: HashSet<_> = bundles.iter().filter_map(|b| b.applied_uid.as_deref()).collect();

    let mut sweep = LeftoverSweep {
        tracked: applied_resources(bundles),
        ..LeftoverSweep::default()
    };
    let tracked_identities: HashSet<_> = sweep
        .tracked
        .iter()
        .map(|m| m.identifier.object_identity())
        .collect();

    for entry in previous {
        let identity = entry.identifier.object_identity();
        if bundles.iter().any(|b| lists(b, entry)) {
            if !tracked_identities.contains(&identity) {
                sweep.tracked.push(entry.clone());
            }
            continue;
        }
        // Same object re-listed under another version
        if entry.uid.as_deref().is_some_and(|uid| applied_uids.contains(uid)) {
            continue;
        }

        match release(client, owner, entry).await {
            Ok(()) => sweep.released.push(entry.clone()),
            Err(e) => {
                warn!(manifest = %entry.identifier, error = %e, "Failed to release left-over object, will retry");
                sweep.tracked.push(entry.clone());
            }
        }
    }
    sweep
}

/// Whether `bundle` targets the object recorded in `entry`
///
/// A manifest whose resource failed to resolve never had its namespace
/// defaulted, so an empty namespace there also matches `default`.
fn lists(bundle: &ManifestProcessingBundle, entry: &AppliedResourceMeta) -> bool {
    let (b, e) = (&bundle.identifier, &entry.identifier);
    if b.kind.is_empty() || (&b.group, &b.version, &b.kind, &b.name) != (&e.group, &e.version, &e.kind, &e.name) {
        return false;
    }
    b.namespace == e.namespace
        || (bundle.apply_result == ApplyResultType::FailedToResolveResource
            && b.namespace.is_empty()
            && e.namespace == DEFAULT_NAMESPACE)
}

async fn release(
    client: &dyn MemberClient,
    owner: &OwnerReference,
    entry: &AppliedResourceMeta,
) -> Result<(), ApplyError> {
    let id = &entry.identifier;
    let gvk = GroupVersionKind::gvk(&id.group, &id.version, &id.kind);
    let resource = match client.resolve(&gvk).await {
        Ok(resource) => resource,
        // Kind no longer served, nothing left to release
        Err(ApplyError::Resolve { .. }) => return Ok(()),
        Err(e) => return Err(e),
    };
    let namespace = resource.scope(&id.namespace);

    let Some(live) = client.get(&resource, namespace, &id.name).await? else {
        return Ok(());
    };
    if entry.uid.is_some() && live.metadata.uid != entry.uid {
        debug!(manifest = %id, "Left-over object was recreated by someone else, skipping");
        return Ok(());
    }
    if !is_owned_by(&live, owner) {
        return Ok(());
    }

    let refs = live.metadata.owner_references.clone().unwrap_or_default();
    let others: Vec<_> = refs.into_iter().filter(|r| r.uid != owner.uid).collect();
    if others.is_empty() {
        client.delete(&resource, namespace, &id.name).await?;
        info!(manifest = %id, "Deleted left-over object");
    } else {
        let patch = json!({ "metadata": { "ownerReferences": others } });
        client.patch_merge(&resource, namespace, &id.name, &patch).await?;
        info!(manifest = %id, "Released left-over object to its other owners");
    }
    Ok(())
}

/// Namespace names among released entries
#[must_use]
pub fn released_namespaces(released: &[AppliedResourceMeta]) -> Vec<String> {
    released
        .iter()
        .filter(|m| m.identifier.group.is_empty() && m.identifier.version == "v1" && m.identifier.kind == "Namespace")
        .map(|m| m.identifier.name.clone())
        .collect()
}
