//! # Apply Executor
//!
//! Creates or updates one manifest on the member cluster using the Work's
//! apply mode.
//!
//! - **Client-side apply**: the applied manifest is kept in the
//!   `kubernetes-fleet.io/last-applied-configuration` annotation; updates are
//!   JSON merge patches that also null out fields dropped since the last apply.
//! - **Server-side apply**: a `Patch::Apply` under the `work-api-agent` field
//!   manager, optionally forcing conflicts.
//!
//! Report-diff mode never reaches this module; it only uses [`diff`].

pub mod client;
pub mod diff;

pub use client::{KubeMemberClient, MemberClient, ResolvedResource};

use crate::constants::LAST_APPLIED_ANNOTATION;
use crate::crd::{ApplyStrategy, ApplyStrategyType, WorkResourceIdentifier};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use serde_json::{Map, Value};
use tracing::debug;

/// Failure applying, fetching or resolving one manifest
///
/// These never abort a reconciliation pass; the processor turns them into
/// per-manifest result tags.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("member API returned {code}: {message}")]
    Api { code: u16, message: String },

    #[error("failed to resolve {gvk}: {message}")]
    Resolve { gvk: String, message: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("member API request failed: {0}")]
    Kube(kube::Error),
}

impl From<kube::Error> for ApplyError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(api_err) => ApplyError::Api {
                code: api_err.code,
                message: api_err.message.clone(),
            },
            other => ApplyError::Kube(other),
        }
    }
}

/// Apply `desired` with the strategy's enforcing mode
///
/// `desired` must already carry the owner references the object should end
/// up with (see [`with_owner_reference`]).
pub async fn apply_manifest(
    client: &dyn MemberClient,
    resource: &ResolvedResource,
    id: &WorkResourceIdentifier,
    desired: &Value,
    live: Option<&DynamicObject>,
    strategy: &ApplyStrategy,
) -> Result<DynamicObject, ApplyError> {
    let namespace = resource.scope(&id.namespace);
    match strategy.r#type {
        ApplyStrategyType::ServerSideApply => {
            let force = strategy
                .server_side_apply_config
                .as_ref()
                .is_some_and(|c| c.force);
            let object = strip_server_fields(desired);
            debug!(manifest = %id, force, "Server-side applying");
            client
                .apply_server_side(resource, namespace, &id.name, &object, force)
                .await
        }
        ApplyStrategyType::ClientSideApply => {
            let mut object = strip_server_fields(desired);
            let last_applied = serde_json::to_string(&object)?;
            set_annotation(&mut object, LAST_APPLIED_ANNOTATION, last_applied);

            match live {
                None => {
                    debug!(manifest = %id, "Creating object");
                    client.create(resource, namespace, &object).await
                }
                Some(live) => {
                    let previous = last_applied_configuration(live);
                    let patch = three_way_merge_patch(previous.as_ref(), &object);
                    debug!(manifest = %id, "Patching object");
                    client
                        .patch_merge(resource, namespace, &id.name, &patch)
                        .await
                }
            }
        }
        ApplyStrategyType::ReportDiff => Err(ApplyError::InvalidManifest(
            "report-diff mode does not apply manifests".to_string(),
        )),
    }
}

/// Copy of `desired` whose owner references are the live object's plus `owner`
pub fn with_owner_reference(
    desired: &Value,
    live: Option<&DynamicObject>,
    owner: &OwnerReference,
) -> Result<Value, ApplyError> {
    let mut refs: Vec<OwnerReference> = match desired.pointer("/metadata/ownerReferences") {
        Some(v) => serde_json::from_value(v.clone())?,
        None => Vec::new(),
    };
    if let Some(live_refs) = live.and_then(|l| l.metadata.owner_references.as_ref()) {
        for r in live_refs {
            if !refs.iter().any(|existing| existing.uid == r.uid) {
                refs.push(r.clone());
            }
        }
    }
    if !refs.iter().any(|r| r.uid == owner.uid) {
        refs.push(owner.clone());
    }

    let mut out = desired.clone();
    let metadata = out
        .as_object_mut()
        .ok_or_else(|| ApplyError::InvalidManifest("manifest is not an object".to_string()))?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    let metadata = metadata
        .as_object_mut()
        .ok_or_else(|| ApplyError::InvalidManifest("metadata is not an object".to_string()))?;
    metadata.insert("ownerReferences".to_string(), serde_json::to_value(refs)?);
    Ok(out)
}

/// Whether `object` lists `owner` among its owner references
#[must_use]
pub fn is_owned_by(object: &DynamicObject, owner: &OwnerReference) -> bool {
    object
        .metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == owner.uid))
}

fn last_applied_configuration(live: &DynamicObject) -> Option<Value> {
    live.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(LAST_APPLIED_ANNOTATION))
        .and_then(|raw| serde_json::from_str(raw).ok())
}

/// Drop fields the API server owns
fn strip_server_fields(desired: &Value) -> Value {
    let mut object = desired.clone();
    if let Some(map) = object.as_object_mut() {
        map.remove("status");
        if let Some(metadata) = map.get_mut("metadata").and_then(Value::as_object_mut) {
            for field in [
                "uid",
                "resourceVersion",
                "generation",
                "creationTimestamp",
                "managedFields",
                "selfLink",
            ] {
                metadata.remove(field);
            }
        }
    }
    object
}

fn set_annotation(object: &mut Value, key: &str, value: String) {
    let Some(map) = object.as_object_mut() else {
        return;
    };
    let metadata = map
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(metadata) = metadata.as_object_mut() {
        let annotations = metadata
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(annotations) = annotations.as_object_mut() {
            annotations.insert(key.to_string(), Value::String(value));
        }
    }
}

/// Merge patch setting every field of `desired` and deleting fields present
/// in `previous` but no longer in `desired`
pub fn three_way_merge_patch(previous: Option<&Value>, desired: &Value) -> Value {
    match (previous, desired) {
        (Some(Value::Object(prev)), Value::Object(want)) => {
            let mut patch = Map::new();
            for (key, value) in want {
                let nested = three_way_merge_patch(prev.get(key), value);
                patch.insert(key.clone(), nested);
            }
            for key in prev.keys() {
                if !want.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => desired.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "placement.kubernetes-fleet.io/v1beta1".to_string(),
            kind: "AppliedWork".to_string(),
            name: "w".to_string(),
            uid: uid.to_string(),
            ..OwnerReference::default()
        }
    }

    #[test]
    fn test_merge_patch_nulls_removed_fields() {
        let previous = json!({ "data": { "a": "1", "b": "2" }, "metadata": { "labels": { "x": "y" } } });
        let desired = json!({ "data": { "a": "3" }, "metadata": {} });
        let patch = three_way_merge_patch(Some(&previous), &desired);
        assert_eq!(
            patch,
            json!({ "data": { "a": "3", "b": null }, "metadata": { "labels": null } })
        );
    }

    #[test]
    fn test_merge_patch_without_previous_is_desired() {
        let desired = json!({ "data": { "a": "1" } });
        assert_eq!(three_way_merge_patch(None, &desired), desired);
    }

    #[test]
    fn test_with_owner_reference_merges_live_refs_once() {
        let desired = json!({ "apiVersion": "v1", "kind": "ConfigMap", "metadata": { "name": "cm" } });
        let mut live: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm" }
        }))
        .unwrap();
        live.metadata.owner_references = Some(vec![owner("other"), owner("ours")]);

        let out = with_owner_reference(&desired, Some(&live), &owner("ours")).unwrap();
        let refs = out.pointer("/metadata/ownerReferences").unwrap().as_array().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0]["uid"], "other");
        assert_eq!(refs[1]["uid"], "ours");
    }

    #[test]
    fn test_strip_server_fields() {
        let desired = json!({
            "metadata": { "name": "cm", "resourceVersion": "5", "uid": "u" },
            "status": {}
        });
        assert_eq!(strip_server_fields(&desired), json!({ "metadata": { "name": "cm" } }));
    }
}
