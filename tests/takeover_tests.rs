//! # Ownership Arbiter Tests

mod common;

use common::applied_work_owner;
use fleet_work_applier::controller::takeover::should_initiate_take_over_attempt;
use fleet_work_applier::crd::{ApplyStrategy, WhenToTakeOver};
use kube::api::DynamicObject;
use serde_json::json;

fn strategy(when: WhenToTakeOver) -> ApplyStrategy {
    ApplyStrategy {
        when_to_take_over: when,
        ..ApplyStrategy::default()
    }
}

fn live(owner_uid: Option<&str>) -> DynamicObject {
    let owners = owner_uid.map_or_else(Vec::new, |uid| {
        vec![json!({
            "apiVersion": "placement.kubernetes-fleet.io/v1beta1",
            "kind": "AppliedWork",
            "name": "work-1",
            "uid": uid,
        })]
    });
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": "cfg", "namespace": "app", "ownerReferences": owners },
    }))
    .unwrap()
}

#[test]
fn test_no_live_object_means_no_take_over() {
    let owner = applied_work_owner();
    assert!(!should_initiate_take_over_attempt(None, &strategy(WhenToTakeOver::Always), &owner));
}

#[test]
fn test_object_already_owned_needs_no_take_over() {
    let owner = applied_work_owner();
    let object = live(Some(&owner.uid));
    assert!(!should_initiate_take_over_attempt(
        Some(&object),
        &strategy(WhenToTakeOver::Always),
        &owner
    ));
}

#[test]
fn test_never_policy_refuses_unowned_object() {
    let owner = applied_work_owner();
    let object = live(None);
    assert!(!should_initiate_take_over_attempt(
        Some(&object),
        &strategy(WhenToTakeOver::Never),
        &owner
    ));
}

#[test]
fn test_always_policy_takes_over_unowned_object() {
    let owner = applied_work_owner();
    for object in [live(None), live(Some("someone-else"))] {
        assert!(should_initiate_take_over_attempt(
            Some(&object),
            &strategy(WhenToTakeOver::Always),
            &owner
        ));
    }
}
