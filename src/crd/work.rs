//! # Work
//!
//! A Work is a named, generation-tracked bundle of manifests that the hub
//! targets at exactly one member cluster, together with the strategy the
//! member agent must use to apply it.

use crate::crd::status::Condition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Work Custom Resource Definition
///
/// Lives in the hub namespace reserved for a member cluster.
///
/// # Example
///
/// ```yaml
/// apiVersion: placement.kubernetes-fleet.io/v1beta1
/// kind: Work
/// metadata:
///   name: crp-web-work
///   namespace: fleet-member-east
///   labels:
///     kubernetes-fleet.io/parent-CRP: crp-web
/// spec:
///   workload:
///     manifests:
///       - apiVersion: v1
///         kind: Namespace
///         metadata:
///           name: web
///   applyStrategy:
///     type: ServerSideApply
///     whenToTakeOver: IfNoDiff
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "Work",
    group = "placement.kubernetes-fleet.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::WorkStatus",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkSpec {
    /// Manifests to apply on the member cluster
    #[serde(default)]
    pub workload: WorkloadTemplate,
    /// How manifests are applied; defaults to client-side apply with take-over always
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_strategy: Option<ApplyStrategy>,
}

/// Ordered list of raw manifests
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadTemplate {
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::manifest_list_schema")]
    pub manifests: Vec<serde_json::Value>,
}

/// Apply strategy configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyStrategy {
    /// Apply mode
    #[serde(default)]
    pub r#type: ApplyStrategyType,
    /// Whether pre-existing, unmanaged objects may be taken over
    #[serde(default)]
    pub when_to_take_over: WhenToTakeOver,
    /// Server-side apply options (only read in ServerSideApply mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_side_apply_config: Option<ServerSideApplyConfig>,
}

/// Apply mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ApplyStrategyType {
    #[default]
    ClientSideApply,
    ServerSideApply,
    /// Compute and report drift; never mutate the member cluster
    ReportDiff,
}

impl ApplyStrategyType {
    /// Whether this mode creates and updates objects
    #[must_use]
    pub fn is_enforcing(&self) -> bool {
        !matches!(self, ApplyStrategyType::ReportDiff)
    }
}

/// Take-over policy for objects that already exist on the member cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
pub enum WhenToTakeOver {
    #[default]
    Always,
    /// Take over only when the live object does not differ from the manifest
    IfNoDiff,
    Never,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSideApplyConfig {
    /// Force field-manager conflicts
    #[serde(default)]
    pub force: bool,
}

/// Work status, written only by the member agent
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkStatus {
    /// Work-level Applied / Available / DiffReported conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// One entry per manifest, in manifest order
    #[serde(default)]
    pub manifest_conditions: Vec<ManifestCondition>,
}

/// Per-manifest observation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestCondition {
    pub identifier: WorkResourceIdentifier,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Differences between the manifest and the live object, when computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_details: Option<DiffDetails>,
}

/// Identity of a manifest within a Work and of the object it maps to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkResourceIdentifier {
    /// Position of the manifest in the Work
    pub ordinal: i32,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    /// Plural resource name, once resolved through discovery
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl WorkResourceIdentifier {
    /// Identity of the target object, ignoring the manifest ordinal
    #[must_use]
    pub fn object_identity(&self) -> (String, String, String, String, String) {
        (
            self.group.clone(),
            self.version.clone(),
            self.kind.clone(),
            self.namespace.clone(),
            self.name.clone(),
        )
    }
}

impl fmt::Display for WorkResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gv = if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        };
        if self.namespace.is_empty() {
            write!(f, "#{} {}, Kind={} {}", self.ordinal, gv, self.kind, self.name)
        } else {
            write!(
                f,
                "#{} {}, Kind={} {}/{}",
                self.ordinal, gv, self.kind, self.namespace, self.name
            )
        }
    }
}

/// Observed differences for one manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffDetails {
    /// Generation of the live object the diff was computed against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_in_member_cluster_generation: Option<i64>,
    #[serde(default)]
    pub observed_diffs: Vec<PatchDetail>,
}

/// A single differing JSON path
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatchDetail {
    /// JSON pointer to the differing field
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_in_member: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_in_hub: Option<String>,
}

/// Namespace/name identity of a Work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkKey {
    pub namespace: String,
    pub name: String,
}

impl WorkKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl Work {
    /// Namespace/name key used by the queue and the rate limiter
    #[must_use]
    pub fn key(&self) -> WorkKey {
        WorkKey::new(
            self.metadata.namespace.clone().unwrap_or_default(),
            self.metadata.name.clone().unwrap_or_default(),
        )
    }

    /// Effective apply strategy (defaults applied)
    #[must_use]
    pub fn apply_strategy(&self) -> ApplyStrategy {
        self.spec.apply_strategy.clone().unwrap_or_default()
    }

    /// Work-level conditions, empty when no status was written yet
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Name of the placement request that produced this Work, from its tracking label
    #[must_use]
    pub fn parent_placement(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(crate::constants::PARENT_PLACEMENT_LABEL))
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}
