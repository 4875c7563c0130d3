//! # Status
//!
//! AppliedWork bookkeeping and Work status writes. Writes are skipped when
//! nothing but transition times would change.

use crate::constants::FIELD_MANAGER;
use crate::controller::processor::status::{build_work_status, status_equivalent};
use crate::controller::processor::ManifestProcessingBundle;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{AppliedResourceMeta, AppliedWork, AppliedWorkSpec, AppliedWorkStatus, Work};
use kube::api::{Api, Patch, PatchParams, PostParams};
use tracing::{debug, info};

/// Fetch or create the AppliedWork anchoring `work` on the member cluster
pub async fn ensure_applied_work(
    ctx: &Reconciler,
    work: &Work,
) -> Result<AppliedWork, ReconcilerError> {
    let api: Api<AppliedWork> = Api::all(ctx.member.clone());
    let name = work.metadata.name.as_deref().unwrap_or_default();
    if let Some(existing) = api.get_opt(name).await? {
        return Ok(existing);
    }

    let applied = AppliedWork::new(
        name,
        AppliedWorkSpec {
            work_name: name.to_string(),
            work_namespace: work.metadata.namespace.clone().unwrap_or_default(),
        },
    );
    match api.create(&PostParams::default(), &applied).await {
        Ok(created) => {
            info!(applied_work = name, "Created AppliedWork");
            Ok(created)
        }
        Err(kube::Error::Api(api_err)) if api_err.code == 409 => Ok(api.get(name).await?),
        Err(e) => Err(e.into()),
    }
}

/// Record the objects the AppliedWork currently anchors
pub async fn update_applied_work_status(
    ctx: &Reconciler,
    applied_work: &AppliedWork,
    applied_resources: Vec<AppliedResourceMeta>,
) -> Result<(), ReconcilerError> {
    let status = AppliedWorkStatus { applied_resources };
    if applied_work.status.as_ref() == Some(&status) {
        return Ok(());
    }

    let api: Api<AppliedWork> = Api::all(ctx.member.clone());
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        applied_work.metadata.name.as_deref().unwrap_or_default(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await?;
    debug!(
        applied = status.applied_resources.len(),
        "Updated AppliedWork status"
    );
    Ok(())
}

/// Write the aggregated Work status, unless it is unchanged
pub async fn update_work_status(
    works: &Api<Work>,
    work: &Work,
    bundles: &[ManifestProcessingBundle],
) -> Result<(), ReconcilerError> {
    let status = build_work_status(work, bundles);
    if status_equivalent(work.status.as_ref(), &status) {
        debug!("Work status unchanged, skipping update");
        return Ok(());
    }

    let patch = serde_json::json!({ "status": status });
    works
        .patch_status(
            work.metadata.name.as_deref().unwrap_or_default(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(patch),
        )
        .await?;
    debug!("Updated Work status");
    Ok(())
}
