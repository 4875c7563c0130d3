//! # Namespace Association Tracker
//!
//! Records which placement request (CRP) caused which namespaces to be
//! applied on this member. The record lives in the member's
//! `InternalMemberCluster` status on the hub; a bounded, deterministic
//! subset is projected as `kubernetes-fleet.io/namespace-<ns>` labels onto
//! the member's `MemberCluster`.
//!
//! Writes carry the resourceVersion they were computed from. A conflicting
//! write is retried from a fresh read, so concurrent Works for the same
//! member merge instead of overwriting each other.

use crate::constants::{FIELD_MANAGER, NAMESPACE_LABEL_PREFIX};
use crate::controller::processor::ManifestProcessingBundle;
use crate::crd::{InternalMemberCluster, MemberCluster, Work};
use crate::observability::metrics;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Placement request name -> namespaces
pub type Associations = BTreeMap<String, Vec<String>>;

/// Longest label name segment allowed by Kubernetes
const MAX_LABEL_SEGMENT_LEN: usize = 63;

#[derive(Debug, thiserror::Error)]
pub enum AssociationError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("member status changed concurrently")]
    Conflict,

    #[error("gave up after {0} conflicting status writes")]
    ConflictRetriesExhausted(u32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Associations as read, with the version they were read at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationSnapshot {
    pub associations: Associations,
    pub resource_version: Option<String>,
}

/// Hub-side storage for one member's association record and labels
#[async_trait]
pub trait MemberStatusStore: Send + Sync {
    async fn read_associations(&self) -> Result<AssociationSnapshot, AssociationError>;

    /// Replace the record with `next`; `Conflict` if `base` is stale
    async fn write_associations(
        &self,
        base: &AssociationSnapshot,
        next: &Associations,
    ) -> Result<(), AssociationError>;

    async fn read_labels(&self) -> Result<BTreeMap<String, String>, AssociationError>;

    /// Merge-patch labels; `None` removes the label
    async fn patch_labels(
        &self,
        patch: &BTreeMap<String, Option<String>>,
    ) -> Result<(), AssociationError>;
}

/// Append `additions` not yet in `existing`, keeping first-seen order
#[must_use]
pub fn merge_unique(existing: &[String], additions: &[String]) -> Vec<String> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut merged = Vec::with_capacity(existing.len() + additions.len());
    for ns in existing.iter().chain(additions) {
        if seen.insert(ns.as_str()) {
            merged.push(ns.clone());
        }
    }
    merged
}

/// Remove namespaces from a placement's set, dropping the entry when it empties
///
/// Returns whether anything changed.
pub fn remove_and_prune(associations: &mut Associations, placement: &str, remove: &[String]) -> bool {
    let Some(namespaces) = associations.get_mut(placement) else {
        return false;
    };
    let before = namespaces.len();
    namespaces.retain(|ns| !remove.contains(ns));
    let changed = namespaces.len() != before;
    if namespaces.is_empty() {
        associations.remove(placement);
        return true;
    }
    changed
}

/// Label changes that bring `existing` in line with `associations`
///
/// Placements are taken in lexicographic order, then their namespaces; the
/// first placement claiming a namespace owns its label. At most `max` labels
/// are kept. Labels outside the `namespace-` prefix are never touched.
#[must_use]
pub fn project_association_labels(
    existing: &BTreeMap<String, String>,
    associations: &Associations,
    max: usize,
) -> BTreeMap<String, Option<String>> {
    let mut desired: BTreeMap<String, String> = BTreeMap::new();
    'placements: for (placement, namespaces) in associations {
        if placement.len() > MAX_LABEL_SEGMENT_LEN {
            continue;
        }
        let mut sorted: Vec<&String> = namespaces.iter().collect();
        sorted.sort();
        for ns in sorted {
            if desired.len() >= max {
                break 'placements;
            }
            let key = format!("{NAMESPACE_LABEL_PREFIX}{ns}");
            let name_segment = key.rsplit('/').next().unwrap_or_default();
            if name_segment.len() > MAX_LABEL_SEGMENT_LEN {
                continue;
            }
            desired.entry(key).or_insert_with(|| placement.clone());
        }
    }

    let mut patch = BTreeMap::new();
    for (key, value) in existing {
        if key.starts_with(NAMESPACE_LABEL_PREFIX) && !desired.contains_key(key) {
            patch.insert(key.clone(), None);
        }
        if let Some(want) = desired.get(key) {
            if want != value {
                patch.insert(key.clone(), Some(want.clone()));
            }
        }
    }
    for (key, value) in desired {
        if !existing.contains_key(&key) {
            patch.insert(key, Some(value));
        }
    }
    patch
}

/// Names of Namespace manifests in `manifests`; malformed entries are skipped
pub fn namespaces_from_manifests<'a>(manifests: impl IntoIterator<Item = &'a Value>) -> Vec<String> {
    manifests
        .into_iter()
        .filter_map(|manifest| {
            let api_version = manifest.get("apiVersion").and_then(Value::as_str);
            let kind = manifest.get("kind").and_then(Value::as_str);
            if api_version != Some("v1") || kind != Some("Namespace") {
                return None;
            }
            match manifest.pointer("/metadata/name").and_then(Value::as_str) {
                Some(name) if !name.is_empty() => Some(name.to_string()),
                _ => {
                    debug!("Skipping Namespace manifest without a name");
                    None
                }
            }
        })
        .collect()
}

/// Namespaces successfully applied in this pass
#[must_use]
pub fn succeeded_namespaces(bundles: &[ManifestProcessingBundle]) -> Vec<String> {
    namespaces_from_manifests(
        bundles
            .iter()
            .filter(|b| b.apply_result.is_applied())
            .map(|b| &b.manifest),
    )
}

/// Association bookkeeping for the member this agent serves
pub struct NamespaceAssociationTracker {
    store: Arc<dyn MemberStatusStore>,
    max_labels: usize,
    max_attempts: u32,
}

impl std::fmt::Debug for NamespaceAssociationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceAssociationTracker")
            .field("max_labels", &self.max_labels)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl NamespaceAssociationTracker {
    #[must_use]
    pub fn new(store: Arc<dyn MemberStatusStore>, max_labels: usize, max_attempts: u32) -> Self {
        Self {
            store,
            max_labels,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Merge `succeeded` into the Work's placement entry
    ///
    /// Works without the placement tracking label are ignored. Returns
    /// whether the member status was written.
    pub async fn update_associations(
        &self,
        work: &Work,
        succeeded: &[String],
    ) -> Result<bool, AssociationError> {
        let Some(placement) = work.parent_placement() else {
            return Ok(false);
        };
        self.mutate(placement, |associations| {
            let existing = associations.get(placement).cloned().unwrap_or_default();
            let merged = merge_unique(&existing, succeeded);
            if merged == existing || merged.is_empty() {
                return false;
            }
            associations.insert(placement.to_string(), merged);
            true
        })
        .await
    }

    /// Remove `namespaces` from the Work's placement entry
    pub async fn remove_associations(
        &self,
        work: &Work,
        namespaces: &[String],
    ) -> Result<bool, AssociationError> {
        let Some(placement) = work.parent_placement() else {
            return Ok(false);
        };
        self.mutate(placement, |associations| {
            remove_and_prune(associations, placement, namespaces)
        })
        .await
    }

    async fn mutate<F>(&self, placement: &str, change: F) -> Result<bool, AssociationError>
    where
        F: Fn(&mut Associations) -> bool + Send + Sync,
    {
        for attempt in 1..=self.max_attempts {
            let snapshot = self.store.read_associations().await?;
            let mut next = snapshot.associations.clone();
            if !change(&mut next) {
                self.sync_labels(&snapshot.associations).await?;
                return Ok(false);
            }
            match self.store.write_associations(&snapshot, &next).await {
                Ok(()) => {
                    metrics::increment_association_writes();
                    info!(placement, namespaces = ?next.get(placement), "Updated namespace associations");
                    self.sync_labels(&next).await?;
                    return Ok(true);
                }
                Err(AssociationError::Conflict) => {
                    debug!(placement, attempt, "Namespace association write conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        warn!(placement, attempts = self.max_attempts, "Giving up on namespace association write");
        Err(AssociationError::ConflictRetriesExhausted(self.max_attempts))
    }

    async fn sync_labels(&self, associations: &Associations) -> Result<(), AssociationError> {
        let existing = self.store.read_labels().await?;
        let patch = project_association_labels(&existing, associations, self.max_labels);
        if patch.is_empty() {
            return Ok(());
        }
        debug!(changes = patch.len(), "Projecting namespace association labels");
        self.store.patch_labels(&patch).await
    }
}

/// Store backed by the hub's `InternalMemberCluster` and `MemberCluster`
pub struct KubeMemberStatusStore {
    hub: Client,
    hub_namespace: String,
    member_name: String,
}

impl std::fmt::Debug for KubeMemberStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeMemberStatusStore")
            .field("hub_namespace", &self.hub_namespace)
            .field("member_name", &self.member_name)
            .finish_non_exhaustive()
    }
}

impl KubeMemberStatusStore {
    #[must_use]
    pub fn new(hub: Client, hub_namespace: impl Into<String>, member_name: impl Into<String>) -> Self {
        Self {
            hub,
            hub_namespace: hub_namespace.into(),
            member_name: member_name.into(),
        }
    }

    fn internal_api(&self) -> Api<InternalMemberCluster> {
        Api::namespaced(self.hub.clone(), &self.hub_namespace)
    }
}

#[async_trait]
impl MemberStatusStore for KubeMemberStatusStore {
    async fn read_associations(&self) -> Result<AssociationSnapshot, AssociationError> {
        let imc = self.internal_api().get(&self.member_name).await?;
        Ok(AssociationSnapshot {
            associations: imc
                .status
                .map(|s| s.namespace_associations)
                .unwrap_or_default(),
            resource_version: imc.metadata.resource_version,
        })
    }

    async fn write_associations(
        &self,
        base: &AssociationSnapshot,
        next: &Associations,
    ) -> Result<(), AssociationError> {
        let mut entries = Map::new();
        for placement in base.associations.keys() {
            if !next.contains_key(placement) {
                entries.insert(placement.clone(), Value::Null);
            }
        }
        for (placement, namespaces) in next {
            entries.insert(placement.clone(), serde_json::to_value(namespaces)?);
        }
        let mut patch = serde_json::json!({
            "status": { "namespaceAssociations": entries }
        });
        if let Some(resource_version) = &base.resource_version {
            patch["metadata"] = serde_json::json!({ "resourceVersion": resource_version });
        }

        match self
            .internal_api()
            .patch_status(
                &self.member_name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Err(AssociationError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_labels(&self) -> Result<BTreeMap<String, String>, AssociationError> {
        let api: Api<MemberCluster> = Api::all(self.hub.clone());
        let member = api.get(&self.member_name).await?;
        Ok(member.metadata.labels.unwrap_or_default())
    }

    async fn patch_labels(
        &self,
        patch: &BTreeMap<String, Option<String>>,
    ) -> Result<(), AssociationError> {
        let api: Api<MemberCluster> = Api::all(self.hub.clone());
        let body = serde_json::json!({ "metadata": { "labels": patch } });
        api.patch(
            &self.member_name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(body),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_merge_unique_keeps_first_seen_order() {
        let merged = merge_unique(&strings(&["b", "a"]), &strings(&["c", "a", "c", "d"]));
        assert_eq!(merged, strings(&["b", "a", "c", "d"]));
    }

    #[test]
    fn test_remove_and_prune_drops_empty_entries() {
        let mut associations = Associations::new();
        associations.insert("crp-1".to_string(), strings(&["a", "b"]));
        assert!(remove_and_prune(&mut associations, "crp-1", &strings(&["a"])));
        assert_eq!(associations["crp-1"], strings(&["b"]));
        assert!(!remove_and_prune(&mut associations, "crp-1", &strings(&["zzz"])));
        assert!(remove_and_prune(&mut associations, "crp-1", &strings(&["b"])));
        assert!(associations.is_empty());
        assert!(!remove_and_prune(&mut associations, "crp-1", &strings(&["b"])));
    }

    #[test]
    fn test_projection_is_bounded_and_preserves_unrelated_labels() {
        let mut associations = Associations::new();
        associations.insert("crp-b".to_string(), strings(&["z", "shared"]));
        associations.insert("crp-a".to_string(), strings(&["shared", "m"]));
        let mut existing = BTreeMap::new();
        existing.insert("team".to_string(), "infra".to_string());
        existing.insert(format!("{NAMESPACE_LABEL_PREFIX}gone"), "crp-x".to_string());

        let patch = project_association_labels(&existing, &associations, 2);
        assert_eq!(patch.len(), 3);
        assert_eq!(patch[&format!("{NAMESPACE_LABEL_PREFIX}gone")], None);
        assert_eq!(patch[&format!("{NAMESPACE_LABEL_PREFIX}m")].as_deref(), Some("crp-a"));
        assert_eq!(patch[&format!("{NAMESPACE_LABEL_PREFIX}shared")].as_deref(), Some("crp-a"));
        assert!(!patch.contains_key("team"));
    }

    #[test]
    fn test_projection_is_empty_when_labels_match() {
        let mut associations = Associations::new();
        associations.insert("crp-a".to_string(), strings(&["web"]));
        let mut existing = BTreeMap::new();
        existing.insert(format!("{NAMESPACE_LABEL_PREFIX}web"), "crp-a".to_string());
        assert!(project_association_labels(&existing, &associations, 20).is_empty());
    }

    #[test]
    fn test_projection_skips_overlong_names() {
        let long_ns = "n".repeat(60);
        let mut associations = Associations::new();
        associations.insert("crp-a".to_string(), vec![long_ns, "ok".to_string()]);
        let patch = project_association_labels(&BTreeMap::new(), &associations, 20);
        assert_eq!(patch.len(), 1);
        assert!(patch.contains_key(&format!("{NAMESPACE_LABEL_PREFIX}ok")));
    }

    #[test]
    fn test_namespaces_from_manifests_skips_malformed() {
        let manifests = [
            json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": "web" } }),
            json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": {} }),
            json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "cm" } }),
            json!("not an object"),
        ];
        assert_eq!(namespaces_from_manifests(manifests.iter()), strings(&["web"]));
    }
}
