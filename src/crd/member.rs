//! # Member Cluster Records
//!
//! Hub-side records describing a member cluster:
//!
//! - `MemberCluster` (cluster-scoped) is the top-level record; namespace
//!   association labels are projected onto it.
//! - `InternalMemberCluster` (in the member's hub namespace) carries the
//!   agent-observed status, including the namespace association record.

use crate::crd::status::Condition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "MemberCluster",
    group = "cluster.kubernetes-fleet.io",
    version = "v1beta1"
)]
#[serde(rename_all = "camelCase")]
pub struct MemberClusterSpec {
    /// How often the member agent reports its status (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_period_seconds: Option<i32>,
}

#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "InternalMemberCluster",
    group = "cluster.kubernetes-fleet.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::InternalMemberClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InternalMemberClusterSpec {
    /// Desired membership state (Join / Leave)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InternalMemberClusterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Placement request name -> namespaces it has successfully applied on this member
    /// Each list is ordered and free of duplicates; empty lists are never stored
    #[serde(default)]
    pub namespace_associations: BTreeMap<String, Vec<String>>,
}
