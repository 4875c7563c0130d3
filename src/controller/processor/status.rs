//! # Work Status Aggregation
//!
//! Turns the bundles of a pass into per-manifest conditions and the
//! Work-level Applied / Available / DiffReported conditions.
//!
//! | Mode | Applied | Available | DiffReported |
//! |------|---------|-----------|--------------|
//! | client/server-side apply | every manifest applied | Unknown unless all applied; then all available or untrackable | removed |
//! | report-diff | removed | removed | every manifest's diff recorded |

use crate::controller::processor::results::{AvailabilityResultType, DiffReportResultType};
use crate::controller::processor::ManifestProcessingBundle;
use crate::crd::{
    conditions_equivalent, remove_condition, set_condition, Condition, ConditionStatus,
    DiffDetails, ManifestCondition, Work, WorkStatus, WORK_CONDITION_APPLIED,
    WORK_CONDITION_AVAILABLE, WORK_CONDITION_DIFF_REPORTED,
};

pub const REASON_ALL_APPLIED: &str = "WorkAllManifestsApplied";
pub const REASON_NOT_ALL_APPLIED: &str = "WorkNotAllManifestsApplied";
pub const REASON_ALL_AVAILABLE: &str = "WorkAllManifestsAvailable";
pub const REASON_NOT_ALL_AVAILABLE: &str = "WorkNotAllManifestsAvailable";
pub const REASON_NOT_ALL_TRACKABLE: &str = "WorkNotAllManifestsTrackable";
pub const REASON_ALL_DIFF_REPORTED: &str = "WorkAllManifestsDiffReported";
pub const REASON_NOT_ALL_DIFF_REPORTED: &str = "WorkNotAllManifestsDiffReported";

/// Status for `work` after a pass that produced `bundles`
///
/// Transition times of conditions whose status did not change are kept.
#[must_use]
pub fn build_work_status(work: &Work, bundles: &[ManifestProcessingBundle]) -> WorkStatus {
    let generation = work.metadata.generation;
    let enforcing = work.apply_strategy().r#type.is_enforcing();
    let previous = work.status.clone().unwrap_or_default();

    let manifest_conditions = bundles
        .iter()
        .map(|bundle| {
            let prior = previous
                .manifest_conditions
                .iter()
                .find(|mc| mc.identifier == bundle.identifier)
                .map(|mc| mc.conditions.clone())
                .unwrap_or_default();
            manifest_condition(bundle, prior, enforcing, generation)
        })
        .collect();

    let mut conditions = previous.conditions;
    if enforcing {
        remove_condition(&mut conditions, WORK_CONDITION_DIFF_REPORTED);
        let (applied, available) = enforcing_conditions(bundles, generation);
        set_condition(&mut conditions, applied);
        set_condition(&mut conditions, available);
    } else {
        remove_condition(&mut conditions, WORK_CONDITION_APPLIED);
        remove_condition(&mut conditions, WORK_CONDITION_AVAILABLE);
        set_condition(&mut conditions, diff_reported_condition(bundles, generation));
    }

    WorkStatus {
        conditions,
        manifest_conditions,
    }
}

fn enforcing_conditions(
    bundles: &[ManifestProcessingBundle],
    generation: Option<i64>,
) -> (Condition, Condition) {
    let total = bundles.len();
    let failed = bundles
        .iter()
        .filter(|b| !b.apply_result.is_applied())
        .count();

    if failed > 0 {
        let message = format!("{failed} of {total} manifests failed to apply");
        return (
            Condition::new(
                WORK_CONDITION_APPLIED,
                ConditionStatus::False,
                REASON_NOT_ALL_APPLIED,
                message.clone(),
                generation,
            ),
            Condition::new(
                WORK_CONDITION_AVAILABLE,
                ConditionStatus::Unknown,
                REASON_NOT_ALL_APPLIED,
                message,
                generation,
            ),
        );
    }

    let applied = Condition::new(
        WORK_CONDITION_APPLIED,
        ConditionStatus::True,
        REASON_ALL_APPLIED,
        format!("All {total} manifests have been applied"),
        generation,
    );
    let unavailable = bundles
        .iter()
        .filter(|b| !b.availability_result.counts_as_available())
        .count();
    let untrackable = bundles
        .iter()
        .filter(|b| b.availability_result == AvailabilityResultType::NotTrackable)
        .count();

    let available = if unavailable > 0 {
        Condition::new(
            WORK_CONDITION_AVAILABLE,
            ConditionStatus::False,
            REASON_NOT_ALL_AVAILABLE,
            format!("{unavailable} of {total} manifests are not yet available"),
            generation,
        )
    } else if untrackable > 0 {
        Condition::new(
            WORK_CONDITION_AVAILABLE,
            ConditionStatus::True,
            REASON_NOT_ALL_TRACKABLE,
            format!("{untrackable} of {total} manifests have no availability signal"),
            generation,
        )
    } else {
        Condition::new(
            WORK_CONDITION_AVAILABLE,
            ConditionStatus::True,
            REASON_ALL_AVAILABLE,
            format!("All {total} manifests are available"),
            generation,
        )
    };
    (applied, available)
}

fn diff_reported_condition(bundles: &[ManifestProcessingBundle], generation: Option<i64>) -> Condition {
    let total = bundles.len();
    let failed = bundles
        .iter()
        .filter(|b| !b.report_diff_result.is_reported())
        .count();
    if failed > 0 {
        Condition::new(
            WORK_CONDITION_DIFF_REPORTED,
            ConditionStatus::False,
            REASON_NOT_ALL_DIFF_REPORTED,
            format!("Diffs of {failed} of {total} manifests could not be reported"),
            generation,
        )
    } else {
        let with_diff = bundles
            .iter()
            .filter(|b| b.report_diff_result == DiffReportResultType::FoundDiff)
            .count();
        Condition::new(
            WORK_CONDITION_DIFF_REPORTED,
            ConditionStatus::True,
            REASON_ALL_DIFF_REPORTED,
            format!("Diffs reported for all {total} manifests; {with_diff} differ"),
            generation,
        )
    }
}

fn manifest_condition(
    bundle: &ManifestProcessingBundle,
    mut conditions: Vec<Condition>,
    enforcing: bool,
    generation: Option<i64>,
) -> ManifestCondition {
    let message = bundle.apply_error.clone().unwrap_or_default();

    if enforcing {
        remove_condition(&mut conditions, WORK_CONDITION_DIFF_REPORTED);
        let status = if bundle.apply_result.is_applied() {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };
        set_condition(
            &mut conditions,
            Condition::new(
                WORK_CONDITION_APPLIED,
                status,
                bundle.apply_result.as_str(),
                message,
                generation,
            ),
        );
        if bundle.apply_result.is_applied() {
            let status = match bundle.availability_result {
                AvailabilityResultType::Available | AvailabilityResultType::NotTrackable => {
                    ConditionStatus::True
                }
                AvailabilityResultType::NotYetAvailable => ConditionStatus::False,
                AvailabilityResultType::FailedToTrack | AvailabilityResultType::Skipped => {
                    ConditionStatus::Unknown
                }
            };
            set_condition(
                &mut conditions,
                Condition::new(
                    WORK_CONDITION_AVAILABLE,
                    status,
                    bundle.availability_result.as_str(),
                    "",
                    generation,
                ),
            );
        } else {
            remove_condition(&mut conditions, WORK_CONDITION_AVAILABLE);
        }
    } else {
        remove_condition(&mut conditions, WORK_CONDITION_APPLIED);
        remove_condition(&mut conditions, WORK_CONDITION_AVAILABLE);
        let status = if bundle.report_diff_result.is_reported() {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };
        set_condition(
            &mut conditions,
            Condition::new(
                WORK_CONDITION_DIFF_REPORTED,
                status,
                bundle.report_diff_result.as_str(),
                message,
                generation,
            ),
        );
    }

    let diff_details = (!bundle.diffs.is_empty()).then(|| DiffDetails {
        observed_in_member_cluster_generation: bundle.live_generation,
        observed_diffs: bundle.diffs.clone(),
    });

    ManifestCondition {
        identifier: bundle.identifier.clone(),
        conditions,
        diff_details,
    }
}

/// Whether writing `new` would change nothing but transition times
#[must_use]
pub fn status_equivalent(old: Option<&WorkStatus>, new: &WorkStatus) -> bool {
    let Some(old) = old else {
        return false;
    };
    conditions_equivalent(&old.conditions, &new.conditions)
        && old.manifest_conditions.len() == new.manifest_conditions.len()
        && old
            .manifest_conditions
            .iter()
            .zip(&new.manifest_conditions)
            .all(|(a, b)| {
                a.identifier == b.identifier
                    && a.diff_details == b.diff_details
                    && conditions_equivalent(&a.conditions, &b.conditions)
            })
}
