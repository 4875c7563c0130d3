//! Test helpers shared by the integration tests
//!
//! In-memory stand-ins for the member cluster and the hub-side member
//! record, plus Work builders.

#![allow(dead_code)]

use async_trait::async_trait;
use fleet_work_applier::controller::apply::{ApplyError, MemberClient, ResolvedResource};
use fleet_work_applier::controller::associations::{
    AssociationError, AssociationSnapshot, Associations, MemberStatusStore,
};
use fleet_work_applier::crd::Work;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::core::{ApiResource, GroupVersionKind};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

type ObjectKey = (String, String, String);

/// In-memory member cluster
#[derive(Debug, Default)]
pub struct FakeMemberClient {
    kinds: Mutex<HashMap<String, ResolvedResource>>,
    objects: Mutex<HashMap<ObjectKey, Value>>,
    failing: Mutex<HashSet<String>>,
    discovery_down: AtomicBool,
    next_uid: AtomicUsize,
    pub creates: AtomicUsize,
    pub patches: AtomicUsize,
    pub applies: AtomicUsize,
    pub deletes: AtomicUsize,
}

fn gvk_key(gvk: &GroupVersionKind) -> String {
    format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

impl FakeMemberClient {
    /// A member serving the common core and apps kinds
    pub fn new() -> Self {
        let client = Self::default();
        client.register("", "v1", "ConfigMap", true);
        client.register("", "v1", "Secret", true);
        client.register("", "v1", "Service", true);
        client.register("", "v1", "Namespace", false);
        client.register("apps", "v1", "Deployment", true);
        client
    }

    pub fn register(&self, group: &str, version: &str, kind: &str, namespaced: bool) {
        let gvk = GroupVersionKind::gvk(group, version, kind);
        self.kinds.lock().unwrap().insert(
            gvk_key(&gvk),
            ResolvedResource {
                api_resource: ApiResource::from_gvk(&gvk),
                namespaced,
            },
        );
    }

    /// Make every write to objects named `name` fail with a 500
    pub fn fail_writes_to(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Make discovery answer 503 until switched back
    pub fn set_discovery_down(&self, down: bool) {
        self.discovery_down.store(down, Ordering::SeqCst);
    }

    /// Seed an object as if created by someone else
    pub fn seed(&self, plural: &str, namespace: &str, object: Value) -> Value {
        let name = object["metadata"]["name"].as_str().unwrap().to_string();
        let stored = self.stamp(object, None);
        self.objects.lock().unwrap().insert(
            (plural.to_string(), namespace.to_string(), name),
            stored.clone(),
        );
        stored
    }

    pub fn object(&self, plural: &str, namespace: &str, name: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&(plural.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn stamp(&self, mut object: Value, previous: Option<&Value>) -> Value {
        let uid = previous
            .and_then(|p| p["metadata"]["uid"].as_str().map(str::to_string))
            .unwrap_or_else(|| format!("uid-{}", self.next_uid.fetch_add(1, Ordering::SeqCst)));
        let generation = previous
            .and_then(|p| p["metadata"]["generation"].as_i64())
            .map_or(1, |g| g + 1);
        object["metadata"]["uid"] = json!(uid);
        object["metadata"]["generation"] = json!(generation);
        object
    }

    fn check_failure(&self, name: &str) -> Result<(), ApplyError> {
        if self.failing.lock().unwrap().contains(name) {
            return Err(ApplyError::Api {
                code: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn key(resource: &ResolvedResource, namespace: Option<&str>, name: &str) -> ObjectKey {
        (
            resource.api_resource.plural.clone(),
            namespace.unwrap_or_default().to_string(),
            name.to_string(),
        )
    }
}

fn to_dynamic(value: &Value) -> Result<DynamicObject, ApplyError> {
    Ok(serde_json::from_value(value.clone())?)
}

/// RFC 7386 JSON merge patch
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Some(patch_map) = patch.as_object() else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    let target_map = target.as_object_mut().unwrap();
    for (key, value) in patch_map {
        if value.is_null() {
            target_map.remove(key);
        } else {
            merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

#[async_trait]
impl MemberClient for FakeMemberClient {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResolvedResource, ApplyError> {
        if self.discovery_down.load(Ordering::SeqCst) {
            return Err(ApplyError::Api {
                code: 503,
                message: "discovery unavailable".to_string(),
            });
        }
        self.kinds
            .lock()
            .unwrap()
            .get(&gvk_key(gvk))
            .cloned()
            .ok_or_else(|| ApplyError::Resolve {
                gvk: gvk_key(gvk),
                message: "kind not served".to_string(),
            })
    }

    async fn get(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ApplyError> {
        let stored = self
            .objects
            .lock()
            .unwrap()
            .get(&Self::key(resource, namespace, name))
            .cloned();
        stored.as_ref().map(to_dynamic).transpose()
    }

    async fn create(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<DynamicObject, ApplyError> {
        let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.check_failure(&name)?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        let key = Self::key(resource, namespace, &name);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(ApplyError::Api {
                code: 409,
                message: "already exists".to_string(),
            });
        }
        let stored = self.stamp(object.clone(), None);
        objects.insert(key, stored.clone());
        to_dynamic(&stored)
    }

    async fn patch_merge(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, ApplyError> {
        self.check_failure(name)?;
        self.patches.fetch_add(1, Ordering::SeqCst);
        let key = Self::key(resource, namespace, name);
        let mut objects = self.objects.lock().unwrap();
        let Some(current) = objects.get(&key).cloned() else {
            return Err(ApplyError::Api {
                code: 404,
                message: "not found".to_string(),
            });
        };
        let mut next = current.clone();
        merge_patch(&mut next, patch);
        let stored = self.stamp(next, Some(&current));
        objects.insert(key, stored.clone());
        to_dynamic(&stored)
    }

    async fn apply_server_side(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
        _force: bool,
    ) -> Result<DynamicObject, ApplyError> {
        self.check_failure(name)?;
        self.applies.fetch_add(1, Ordering::SeqCst);
        let key = Self::key(resource, namespace, name);
        let mut objects = self.objects.lock().unwrap();
        let current = objects.get(&key).cloned();
        let mut next = current.clone().unwrap_or_else(|| json!({}));
        merge_patch(&mut next, object);
        let stored = self.stamp(next, current.as_ref());
        objects.insert(key, stored.clone());
        to_dynamic(&stored)
    }

    async fn delete(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApplyError> {
        self.check_failure(name)?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .remove(&Self::key(resource, namespace, name));
        Ok(())
    }
}

/// In-memory member record with optimistic versioning
#[derive(Debug, Default)]
pub struct FakeStatusStore {
    associations: Mutex<Associations>,
    version: AtomicUsize,
    labels: Mutex<BTreeMap<String, String>>,
    conflicts_remaining: AtomicU32,
    pub writes: AtomicUsize,
    pub label_patches: AtomicUsize,
}

impl FakeStatusStore {
    /// Fail the next `count` writes as if another writer got there first
    pub fn inject_conflicts(&self, count: u32) {
        self.conflicts_remaining.store(count, Ordering::SeqCst);
    }

    pub fn associations(&self) -> Associations {
        self.associations.lock().unwrap().clone()
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.labels.lock().unwrap().clone()
    }

    /// Simulate a concurrent writer replacing the record
    pub fn set_associations(&self, associations: Associations) {
        *self.associations.lock().unwrap() = associations;
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MemberStatusStore for FakeStatusStore {
    async fn read_associations(&self) -> Result<AssociationSnapshot, AssociationError> {
        Ok(AssociationSnapshot {
            associations: self.associations(),
            resource_version: Some(self.version.load(Ordering::SeqCst).to_string()),
        })
    }

    async fn write_associations(
        &self,
        base: &AssociationSnapshot,
        next: &Associations,
    ) -> Result<(), AssociationError> {
        if self
            .conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AssociationError::Conflict);
        }
        let current = self.version.load(Ordering::SeqCst).to_string();
        if base.resource_version.as_deref() != Some(current.as_str()) {
            return Err(AssociationError::Conflict);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.set_associations(next.clone());
        Ok(())
    }

    async fn read_labels(&self) -> Result<BTreeMap<String, String>, AssociationError> {
        Ok(self.labels())
    }

    async fn patch_labels(
        &self,
        patch: &BTreeMap<String, Option<String>>,
    ) -> Result<(), AssociationError> {
        self.label_patches.fetch_add(1, Ordering::SeqCst);
        let mut labels = self.labels.lock().unwrap();
        for (key, value) in patch {
            match value {
                Some(v) => labels.insert(key.clone(), v.clone()),
                None => labels.remove(key),
            };
        }
        Ok(())
    }
}

/// Work built from a JSON body merged over sensible defaults
pub fn work_from(spec: Value, extra_metadata: Value) -> Work {
    let mut metadata = json!({
        "name": "work-1",
        "namespace": "fleet-member-cluster-a",
        "uid": "work-uid",
        "generation": 1,
        "creationTimestamp": "2026-01-01T00:00:00Z",
    });
    merge_patch(&mut metadata, &extra_metadata);
    serde_json::from_value(json!({
        "apiVersion": "placement.kubernetes-fleet.io/v1beta1",
        "kind": "Work",
        "metadata": metadata,
        "spec": spec,
    }))
    .unwrap()
}

/// Work with the given manifests and apply strategy
pub fn work_with(manifests: Vec<Value>, strategy: Value) -> Work {
    work_from(
        json!({
            "workload": { "manifests": manifests },
            "applyStrategy": strategy,
        }),
        json!({}),
    )
}

/// Owner reference for an AppliedWork called `work-1`
pub fn applied_work_owner() -> OwnerReference {
    OwnerReference {
        api_version: "placement.kubernetes-fleet.io/v1beta1".to_string(),
        kind: "AppliedWork".to_string(),
        name: "work-1".to_string(),
        uid: "applied-work-uid".to_string(),
        block_owner_deletion: Some(false),
        controller: Some(false),
    }
}

pub fn config_map(name: &str, data: Value) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "namespace": "app" },
        "data": data,
    })
}

pub fn namespace(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name },
    })
}
