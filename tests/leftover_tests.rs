//! # Left-over Release Tests
//!
//! Objects recorded in an AppliedWork but no longer listed by its Work.

mod common;

use common::{applied_work_owner, config_map, work_with, FakeMemberClient};
use fleet_work_applier::controller::processor::process_manifests;
use fleet_work_applier::controller::processor::results::ApplyResultType;
use fleet_work_applier::controller::reconciler::cleanup::release_leftovers;
use fleet_work_applier::crd::AppliedResourceMeta;
use serde_json::json;
use std::sync::atomic::Ordering;

async fn applied(member: &FakeMemberClient, names: &[&str]) -> Vec<AppliedResourceMeta> {
    let manifests = names.iter().map(|n| config_map(n, json!({}))).collect();
    let work = work_with(manifests, json!({}));
    let bundles = process_manifests(member, &work, &applied_work_owner()).await;
    fleet_work_applier::controller::processor::applied_resources(&bundles)
}

#[tokio::test]
async fn test_dropped_manifest_is_deleted_when_solely_owned() {
    let member = FakeMemberClient::new();
    let owner = applied_work_owner();
    let previous = applied(&member, &["keep", "drop"]).await;

    let work = work_with(vec![config_map("keep", json!({}))], json!({}));
    let bundles = process_manifests(&member, &work, &owner).await;
    let sweep = release_leftovers(&member, &owner, &previous, &bundles).await;

    assert_eq!(sweep.released.len(), 1);
    assert_eq!(sweep.released[0].identifier.name, "drop");
    assert_eq!(sweep.tracked.len(), 1);
    assert!(member.object("configmaps", "app", "drop").is_none());
    assert!(member.object("configmaps", "app", "keep").is_some());
}

#[tokio::test]
async fn test_shared_object_is_released_not_deleted() {
    let member = FakeMemberClient::new();
    let owner = applied_work_owner();
    member.seed(
        "configmaps",
        "app",
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "shared",
                "namespace": "app",
                "ownerReferences": [{
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "name": "other",
                    "uid": "other-uid",
                }],
            },
        }),
    );
    let previous = applied(&member, &["shared"]).await;

    let sweep = release_leftovers(&member, &owner, &previous, &[]).await;

    assert_eq!(sweep.released.len(), 1);
    assert_eq!(member.deletes.load(Ordering::SeqCst), 0);
    let stored = member.object("configmaps", "app", "shared").unwrap();
    assert_eq!(stored["metadata"]["ownerReferences"], json!([{
        "apiVersion": "v1",
        "kind": "Pod",
        "name": "other",
        "uid": "other-uid",
    }]));
}

#[tokio::test]
async fn test_failed_release_keeps_entry_for_retry() {
    let member = FakeMemberClient::new();
    let owner = applied_work_owner();
    let previous = applied(&member, &["stuck"]).await;
    member.fail_writes_to("stuck");

    let sweep = release_leftovers(&member, &owner, &previous, &[]).await;

    assert!(sweep.released.is_empty());
    assert_eq!(sweep.tracked, previous);
    assert!(member.object("configmaps", "app", "stuck").is_some());
}

#[tokio::test]
async fn test_listed_manifest_that_failed_stays_tracked() {
    let member = FakeMemberClient::new();
    let owner = applied_work_owner();
    let previous = applied(&member, &["flaky"]).await;
    member.fail_writes_to("flaky");

    let work = work_with(vec![config_map("flaky", json!({ "a": "2" }))], json!({}));
    let bundles = process_manifests(&member, &work, &owner).await;
    let sweep = release_leftovers(&member, &owner, &previous, &bundles).await;

    assert!(sweep.released.is_empty());
    assert_eq!(sweep.tracked, previous);
    assert_eq!(member.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unresolved_manifest_in_default_namespace_stays_tracked() {
    let member = FakeMemberClient::new();
    let owner = applied_work_owner();
    let manifest = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": "cfg" },
        "data": { "a": "1" },
    });
    let work = work_with(vec![manifest], json!({}));
    let first = process_manifests(&member, &work, &owner).await;
    let previous = fleet_work_applier::controller::processor::applied_resources(&first);
    assert_eq!(previous[0].identifier.namespace, "default");

    member.set_discovery_down(true);
    let bundles = process_manifests(&member, &work, &owner).await;
    member.set_discovery_down(false);
    assert_eq!(bundles[0].apply_result, ApplyResultType::FailedToResolveResource);

    let sweep = release_leftovers(&member, &owner, &previous, &bundles).await;

    assert!(sweep.released.is_empty());
    assert_eq!(sweep.tracked, previous);
    assert_eq!(member.deletes.load(Ordering::SeqCst), 0);
    assert!(member.object("configmaps", "default", "cfg").is_some());
}

#[tokio::test]
async fn test_discovery_outage_during_sweep_keeps_entry() {
    let member = FakeMemberClient::new();
    let owner = applied_work_owner();
    let previous = applied(&member, &["dropped"]).await;

    member.set_discovery_down(true);
    let sweep = release_leftovers(&member, &owner, &previous, &[]).await;
    member.set_discovery_down(false);

    assert!(sweep.released.is_empty());
    assert_eq!(sweep.tracked, previous);
    assert!(member.object("configmaps", "app", "dropped").is_some());

    let retried = release_leftovers(&member, &owner, &previous, &[]).await;
    assert_eq!(retried.released.len(), 1);
    assert!(member.object("configmaps", "app", "dropped").is_none());
}
