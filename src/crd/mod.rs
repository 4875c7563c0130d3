//! # Custom Resource Definitions
//!
//! CRD types used by the work applier.
//!
//! ## Module Structure
//!
//! - `work.rs` - hub-side Work bundle, apply strategy and Work status
//! - `applied_work.rs` - member-side owner anchor for applied objects
//! - `member.rs` - hub-side member records (namespace associations, labels)
//! - `status.rs` - condition type and helpers

mod applied_work;
mod member;
mod status;
mod work;

// Re-export all public types
pub use applied_work::{AppliedResourceMeta, AppliedWork, AppliedWorkSpec, AppliedWorkStatus};
pub use member::{
    InternalMemberCluster, InternalMemberClusterSpec, InternalMemberClusterStatus, MemberCluster,
    MemberClusterSpec,
};
pub use status::{
    conditions_equivalent, find_condition, is_condition_true, remove_condition, set_condition,
    Condition, ConditionStatus, WORK_CONDITION_APPLIED, WORK_CONDITION_AVAILABLE,
    WORK_CONDITION_DIFF_REPORTED,
};
pub use work::{
    ApplyStrategy, ApplyStrategyType, DiffDetails, ManifestCondition, PatchDetail,
    ServerSideApplyConfig, WhenToTakeOver, Work, WorkKey, WorkResourceIdentifier, WorkSpec,
    WorkStatus, WorkloadTemplate,
};

/// Schema for raw manifest lists: arbitrary objects the API server must keep verbatim
pub(crate) fn manifest_list_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}
