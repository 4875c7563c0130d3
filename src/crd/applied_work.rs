//! # AppliedWork
//!
//! Cluster-scoped anchor on the member cluster, one per Work. Every object
//! the agent creates or takes over carries an owner reference to it, so
//! deleting the AppliedWork lets the member's garbage collector remove the
//! whole bundle.

use crate::crd::work::WorkResourceIdentifier;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use serde::{Deserialize, Serialize};

#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "AppliedWork",
    group = "placement.kubernetes-fleet.io",
    version = "v1beta1",
    status = "crate::crd::AppliedWorkStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AppliedWorkSpec {
    /// Name of the hub Work this object mirrors
    pub work_name: String,
    /// Hub namespace of the Work
    pub work_namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedWorkStatus {
    /// Objects applied (created, updated or taken over) by the latest pass
    #[serde(default)]
    pub applied_resources: Vec<AppliedResourceMeta>,
}

/// Identity of an object applied on the member cluster
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResourceMeta {
    pub identifier: WorkResourceIdentifier,
    /// UID of the live object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl AppliedWork {
    /// Owner reference added to every object this AppliedWork anchors
    ///
    /// Returns `None` until the object has been persisted and carries a UID.
    #[must_use]
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        let uid = self.metadata.uid.clone()?;
        Some(OwnerReference {
            api_version: AppliedWork::api_version(&()).into_owned(),
            kind: AppliedWork::kind(&()).into_owned(),
            name: self.metadata.name.clone().unwrap_or_default(),
            uid,
            block_owner_deletion: Some(false),
            controller: Some(false),
        })
    }
}
