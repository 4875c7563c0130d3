//! # Manifest Bundle Processor
//!
//! Drives one reconciliation pass over a Work's manifests, in manifest
//! order, and records an outcome bundle per manifest:
//!
//! 1. decode and validate the manifest (`DecodingErred`, `FoundGenerateName`)
//! 2. resolve its resource through discovery (`FailedToResolveResource`)
//! 3. reject repeated object identities (`Duplicated`)
//! 4. fetch the live object (`FailedToFindObjInMemberCluster`)
//! 5. report drift (report-diff mode) or arbitrate ownership and apply
//! 6. evaluate availability of applied objects
//!
//! Failures are recorded on the bundle and never abort the pass.

pub mod results;
pub mod status;

use crate::constants::MAX_DIFF_DETAILS_PER_MANIFEST;
use crate::controller::apply::diff::compute_diffs;
use crate::controller::apply::{
    apply_manifest, is_owned_by, with_owner_reference, MemberClient, ResolvedResource,
};
use crate::controller::availability::track_availability;
use crate::controller::takeover::should_initiate_take_over_attempt;
use crate::crd::{
    AppliedResourceMeta, ApplyStrategy, PatchDetail, WhenToTakeOver, Work, WorkResourceIdentifier,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use results::{ApplyResultType, AvailabilityResultType, DiffReportResultType};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Display;
use tracing::{debug, warn};

/// Outcome of one manifest in one pass
#[derive(Debug, Clone)]
pub struct ManifestProcessingBundle {
    pub manifest: Value,
    pub identifier: WorkResourceIdentifier,
    pub apply_result: ApplyResultType,
    /// Error detail for failed results
    pub apply_error: Option<String>,
    pub availability_result: AvailabilityResultType,
    pub report_diff_result: DiffReportResultType,
    /// Drift found in report-diff mode or by a failed if-no-diff take-over
    pub diffs: Vec<PatchDetail>,
    /// Generation of the live object after the pass
    pub live_generation: Option<i64>,
    /// UID of the applied object
    pub applied_uid: Option<String>,
}

impl ManifestProcessingBundle {
    #[must_use]
    pub fn new(ordinal: i32, manifest: Value) -> Self {
        Self {
            manifest,
            identifier: WorkResourceIdentifier {
                ordinal,
                ..WorkResourceIdentifier::default()
            },
            apply_result: ApplyResultType::NoApplyPerformed,
            apply_error: None,
            availability_result: AvailabilityResultType::Skipped,
            report_diff_result: DiffReportResultType::Skipped,
            diffs: Vec::new(),
            live_generation: None,
            applied_uid: None,
        }
    }

    /// The (apply, availability, diff-report) tuple fed to the fingerprint
    #[must_use]
    pub fn result_tuple(&self) -> (ApplyResultType, AvailabilityResultType, DiffReportResultType) {
        (
            self.apply_result,
            self.availability_result,
            self.report_diff_result,
        )
    }

    fn fail(&mut self, result: ApplyResultType, error: impl Display) {
        debug!(manifest = %self.identifier, result = result.as_str(), error = %error, "Manifest not applied");
        self.apply_result = result;
        self.apply_error = Some(error.to_string());
    }

    fn record_diffs(&mut self, mut diffs: Vec<PatchDetail>) {
        diffs.truncate(MAX_DIFF_DETAILS_PER_MANIFEST);
        self.diffs = diffs;
    }
}

/// Process every manifest of `work` against the member cluster
///
/// `owner` is the reference to the Work's AppliedWork; it is added to every
/// object the pass creates or takes over.
pub async fn process_manifests(
    client: &dyn MemberClient,
    work: &Work,
    owner: &OwnerReference,
) -> Vec<ManifestProcessingBundle> {
    let strategy = work.apply_strategy();
    let mut seen = HashSet::new();
    let mut bundles = Vec::with_capacity(work.spec.workload.manifests.len());

    for (index, manifest) in work.spec.workload.manifests.iter().enumerate() {
        let ordinal = i32::try_from(index).unwrap_or(i32::MAX);
        let mut bundle = ManifestProcessingBundle::new(ordinal, manifest.clone());
        process_one(client, &mut bundle, &strategy, owner, &mut seen).await;
        bundles.push(bundle);
    }
    bundles
}

async fn process_one(
    client: &dyn MemberClient,
    bundle: &mut ManifestProcessingBundle,
    strategy: &ApplyStrategy,
    owner: &OwnerReference,
    seen: &mut HashSet<(String, String, String, String, String)>,
) {
    let Some(gvk) = decode(bundle) else {
        return;
    };

    let resource = match client.resolve(&gvk).await {
        Ok(resource) => resource,
        Err(e) => {
            bundle.fail(ApplyResultType::FailedToResolveResource, e);
            return;
        }
    };
    bundle
        .identifier
        .resource
        .clone_from(&resource.api_resource.plural);
    bundle.identifier.namespace = resource
        .scope(&bundle.identifier.namespace)
        .unwrap_or_default()
        .to_string();

    if !seen.insert(bundle.identifier.object_identity()) {
        bundle.fail(
            ApplyResultType::Duplicated,
            "an earlier manifest in this Work targets the same object",
        );
        return;
    }

    let namespace = resource.scope(&bundle.identifier.namespace);
    let live = match client.get(&resource, namespace, &bundle.identifier.name).await {
        Ok(live) => live,
        Err(e) => {
            bundle.fail(ApplyResultType::FailedToFindObjInMemberCluster, e);
            return;
        }
    };

    if strategy.r#type.is_enforcing() {
        enforce(client, bundle, &resource, live.as_ref(), strategy, owner).await;
    } else {
        report_diff(bundle, live.as_ref());
    }
}

/// Validate the manifest and fill in its identifier
fn decode(bundle: &mut ManifestProcessingBundle) -> Option<GroupVersionKind> {
    if !bundle.manifest.is_object() {
        bundle.fail(ApplyResultType::DecodingErred, "manifest is not a JSON object");
        return None;
    }
    let manifest = &bundle.manifest;
    let str_at = |pointer: &str| {
        manifest
            .pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let api_version = str_at("/apiVersion");
    let kind = str_at("/kind");
    let name = str_at("/metadata/name");
    let generate_name = str_at("/metadata/generateName");
    let namespace = str_at("/metadata/namespace");

    if api_version.is_empty() || kind.is_empty() {
        bundle.fail(ApplyResultType::DecodingErred, "manifest has no apiVersion or kind");
        return None;
    }
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version),
    };
    bundle.identifier.group.clone_from(&group);
    bundle.identifier.version.clone_from(&version);
    bundle.identifier.kind.clone_from(&kind);
    bundle.identifier.namespace = namespace;
    bundle.identifier.name.clone_from(&name);

    if name.is_empty() {
        if generate_name.is_empty() {
            bundle.fail(ApplyResultType::DecodingErred, "manifest has no metadata.name");
        } else {
            bundle.fail(
                ApplyResultType::FoundGenerateName,
                "manifests using generateName cannot be tracked",
            );
        }
        return None;
    }
    Some(GroupVersionKind::gvk(&group, &version, &kind))
}

fn report_diff(bundle: &mut ManifestProcessingBundle, live: Option<&DynamicObject>) {
    bundle.apply_result = ApplyResultType::NoApplyPerformed;
    let Some(live) = live else {
        bundle.report_diff_result = DiffReportResultType::FoundDiff;
        bundle.record_diffs(vec![PatchDetail {
            path: "/".to_string(),
            value_in_member: None,
            value_in_hub: Some(format!("{} {}", bundle.identifier.kind, bundle.identifier.name)),
        }]);
        return;
    };
    bundle.live_generation = live.metadata.generation;
    match serde_json::to_value(live) {
        Ok(live_value) => {
            let diffs = compute_diffs(&bundle.manifest, &live_value);
            bundle.report_diff_result = if diffs.is_empty() {
                DiffReportResultType::NoDiffFound
            } else {
                DiffReportResultType::FoundDiff
            };
            bundle.record_diffs(diffs);
        }
        Err(e) => {
            warn!(manifest = %bundle.identifier, error = %e, "Failed to encode live object for diff");
            bundle.report_diff_result = DiffReportResultType::FailedToReportDiff;
            bundle.apply_error = Some(e.to_string());
        }
    }
}

async fn enforce(
    client: &dyn MemberClient,
    bundle: &mut ManifestProcessingBundle,
    resource: &ResolvedResource,
    live: Option<&DynamicObject>,
    strategy: &ApplyStrategy,
    owner: &OwnerReference,
) {
    let take_over = should_initiate_take_over_attempt(live, strategy, owner);
    if let Some(live) = live {
        if !take_over && !is_owned_by(live, owner) {
            bundle.fail(
                ApplyResultType::NotTakenOver,
                "object exists and is not managed by this Work; take-over is disabled",
            );
            return;
        }
        if take_over && strategy.when_to_take_over == WhenToTakeOver::IfNoDiff {
            let diffs = match serde_json::to_value(live) {
                Ok(live_value) => compute_diffs(&bundle.manifest, &live_value),
                Err(e) => {
                    bundle.fail(ApplyResultType::FailedToTakeOver, e);
                    return;
                }
            };
            if !diffs.is_empty() {
                let count = diffs.len();
                bundle.record_diffs(diffs);
                bundle.fail(
                    ApplyResultType::FailedToTakeOver,
                    format!("object differs from the manifest in {count} field(s)"),
                );
                return;
            }
        }
    }
    if take_over {
        debug!(manifest = %bundle.identifier, "Taking over existing object");
    }

    let desired = match with_owner_reference(&bundle.manifest, live, owner) {
        Ok(desired) => desired,
        Err(e) => {
            bundle.fail(ApplyResultType::FailedToApply, e);
            return;
        }
    };
    let applied =
        match apply_manifest(client, resource, &bundle.identifier, &desired, live, strategy).await {
            Ok(applied) => applied,
            Err(e) => {
                bundle.fail(ApplyResultType::FailedToApply, e);
                return;
            }
        };

    bundle.apply_result = ApplyResultType::Applied;
    bundle.apply_error = None;
    bundle.live_generation = applied.metadata.generation;
    bundle.applied_uid.clone_from(&applied.metadata.uid);
    bundle.availability_result = match serde_json::to_value(&applied) {
        Ok(value) => track_availability(&bundle.identifier.group, &bundle.identifier.kind, &value),
        Err(e) => {
            warn!(manifest = %bundle.identifier, error = %e, "Failed to encode applied object");
            AvailabilityResultType::FailedToTrack
        }
    };
}

/// Identities of the objects applied in this pass, for the AppliedWork status
#[must_use]
pub fn applied_resources(bundles: &[ManifestProcessingBundle]) -> Vec<AppliedResourceMeta> {
    bundles
        .iter()
        .filter(|b| b.apply_result.is_applied())
        .map(|b| AppliedResourceMeta {
            identifier: b.identifier.clone(),
            uid: b.applied_uid.clone(),
        })
        .collect()
}
