//! # Ownership Arbiter
//!
//! Decides whether the engine should try to take over an object that
//! already exists on the member cluster. The no-diff check for
//! `IfNoDiff` happens in the processor before ownership is transferred;
//! this predicate only decides whether to attempt it.

use crate::controller::apply::is_owned_by;
use crate::crd::{ApplyStrategy, WhenToTakeOver};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;

/// Whether a take-over of `live` should be attempted before applying
#[must_use]
pub fn should_initiate_take_over_attempt(
    live: Option<&DynamicObject>,
    strategy: &ApplyStrategy,
    expected_owner: &OwnerReference,
) -> bool {
    let Some(live) = live else {
        return false;
    };
    match strategy.when_to_take_over {
        WhenToTakeOver::Never => false,
        WhenToTakeOver::Always | WhenToTakeOver::IfNoDiff => !is_owned_by(live, expected_owner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if_no_diff_attempts_take_over_of_unowned_object() {
        let owner = OwnerReference {
            uid: "ours".to_string(),
            ..OwnerReference::default()
        };
        let live: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm" }
        }))
        .unwrap();
        let strategy = ApplyStrategy {
            when_to_take_over: WhenToTakeOver::IfNoDiff,
            ..ApplyStrategy::default()
        };
        assert!(should_initiate_take_over_attempt(Some(&live), &strategy, &owner));
    }
}
