//! # Availability Tracker
//!
//! Decides whether an applied object is healthy, from its kind and status.
//! Kinds without a readiness rule are `NotTrackable`; pure data kinds are
//! available as soon as they exist.

use crate::controller::processor::results::AvailabilityResultType;
use serde_json::Value;

/// Kinds that are available once they exist, as (group, kind)
const ALWAYS_AVAILABLE: &[(&str, &str)] = &[
    ("", "Namespace"),
    ("", "ConfigMap"),
    ("", "Secret"),
    ("", "ServiceAccount"),
    ("", "LimitRange"),
    ("", "ResourceQuota"),
    ("rbac.authorization.k8s.io", "Role"),
    ("rbac.authorization.k8s.io", "ClusterRole"),
    ("rbac.authorization.k8s.io", "RoleBinding"),
    ("rbac.authorization.k8s.io", "ClusterRoleBinding"),
    ("networking.k8s.io", "NetworkPolicy"),
    ("networking.k8s.io", "IngressClass"),
    ("scheduling.k8s.io", "PriorityClass"),
    ("storage.k8s.io", "StorageClass"),
    ("policy", "PodDisruptionBudget"),
];

/// Evaluate the availability of a live object
pub fn track_availability(group: &str, kind: &str, object: &Value) -> AvailabilityResultType {
    if !object.is_object() {
        return AvailabilityResultType::FailedToTrack;
    }
    if ALWAYS_AVAILABLE.contains(&(group, kind)) {
        return AvailabilityResultType::Available;
    }
    let available = match (group, kind) {
        ("apps", "Deployment") => deployment_available(object),
        ("apps", "StatefulSet") => stateful_set_available(object),
        ("apps", "DaemonSet") => daemon_set_available(object),
        ("batch", "Job") => job_available(object),
        ("", "Service") => match service_available(object) {
            Some(available) => available,
            None => return AvailabilityResultType::NotTrackable,
        },
        ("apiextensions.k8s.io", "CustomResourceDefinition") => {
            condition_true(object, "Established") && condition_true(object, "NamesAccepted")
        }
        _ => return AvailabilityResultType::NotTrackable,
    };
    if available {
        AvailabilityResultType::Available
    } else {
        AvailabilityResultType::NotYetAvailable
    }
}

fn int_at(object: &Value, pointer: &str) -> Option<i64> {
    object.pointer(pointer).and_then(Value::as_i64)
}

/// The controller has observed the current generation
fn status_is_current(object: &Value) -> bool {
    match (
        int_at(object, "/metadata/generation"),
        int_at(object, "/status/observedGeneration"),
    ) {
        (Some(generation), Some(observed)) => observed >= generation,
        (None, _) => true,
        (Some(_), None) => false,
    }
}

fn condition_true(object: &Value, r#type: &str) -> bool {
    object
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(r#type)
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}

fn deployment_available(object: &Value) -> bool {
    let desired = int_at(object, "/spec/replicas").unwrap_or(1);
    status_is_current(object)
        && int_at(object, "/status/updatedReplicas").unwrap_or(0) == desired
        && int_at(object, "/status/availableReplicas").unwrap_or(0) >= desired
        && int_at(object, "/status/replicas").unwrap_or(0) == desired
}

fn stateful_set_available(object: &Value) -> bool {
    let desired = int_at(object, "/spec/replicas").unwrap_or(1);
    let current_revision = object.pointer("/status/currentRevision");
    status_is_current(object)
        && int_at(object, "/status/availableReplicas").unwrap_or(0) >= desired
        && int_at(object, "/status/updatedReplicas").unwrap_or(0) == desired
        && current_revision.is_some()
        && current_revision == object.pointer("/status/updateRevision")
}

fn daemon_set_available(object: &Value) -> bool {
    let desired = int_at(object, "/status/desiredNumberScheduled").unwrap_or(0);
    status_is_current(object)
        && int_at(object, "/status/numberAvailable").unwrap_or(0) == desired
        && int_at(object, "/status/updatedNumberScheduled").unwrap_or(0) == desired
}

fn job_available(object: &Value) -> bool {
    if condition_true(object, "Complete") {
        return true;
    }
    if condition_true(object, "Failed") {
        return false;
    }
    let parallelism = int_at(object, "/spec/parallelism").unwrap_or(1);
    int_at(object, "/status/succeeded").unwrap_or(0) > 0
        || (parallelism > 0 && int_at(object, "/status/ready").unwrap_or(0) >= parallelism)
}

/// `None` for service types without an availability signal
fn service_available(object: &Value) -> Option<bool> {
    let service_type = object
        .pointer("/spec/type")
        .and_then(Value::as_str)
        .unwrap_or("ClusterIP");
    match service_type {
        "ClusterIP" | "NodePort" => Some(
            object
                .pointer("/spec/clusterIP")
                .and_then(Value::as_str)
                .is_some_and(|ip| !ip.is_empty()),
        ),
        "LoadBalancer" => Some(
            object
                .pointer("/status/loadBalancer/ingress")
                .and_then(Value::as_array)
                .is_some_and(|ingress| {
                    ingress
                        .iter()
                        .any(|i| i.get("ip").is_some() || i.get("hostname").is_some())
                }),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deployment_rollout() {
        let mut deploy = json!({
            "metadata": { "generation": 2 },
            "spec": { "replicas": 3 },
            "status": { "observedGeneration": 1, "replicas": 3, "updatedReplicas": 3, "availableReplicas": 3 }
        });
        assert_eq!(
            track_availability("apps", "Deployment", &deploy),
            AvailabilityResultType::NotYetAvailable
        );
        deploy["status"]["observedGeneration"] = json!(2);
        assert_eq!(
            track_availability("apps", "Deployment", &deploy),
            AvailabilityResultType::Available
        );
        deploy["status"]["replicas"] = json!(4);
        assert_eq!(
            track_availability("apps", "Deployment", &deploy),
            AvailabilityResultType::NotYetAvailable
        );
    }

    #[test]
    fn test_data_kinds_are_available() {
        let cm = json!({ "metadata": { "name": "cm" } });
        assert_eq!(track_availability("", "ConfigMap", &cm), AvailabilityResultType::Available);
        assert_eq!(track_availability("", "Namespace", &cm), AvailabilityResultType::Available);
    }

    #[test]
    fn test_unknown_kinds_are_not_trackable() {
        let obj = json!({ "spec": {} });
        assert_eq!(
            track_availability("example.com", "Widget", &obj),
            AvailabilityResultType::NotTrackable
        );
        let svc = json!({ "spec": { "type": "ExternalName" } });
        assert_eq!(track_availability("", "Service", &svc), AvailabilityResultType::NotTrackable);
    }

    #[test]
    fn test_job_and_crd() {
        let job = json!({ "status": { "conditions": [ { "type": "Complete", "status": "True" } ] } });
        assert_eq!(track_availability("batch", "Job", &job), AvailabilityResultType::Available);
        let failed = json!({ "status": { "conditions": [ { "type": "Failed", "status": "True" } ] } });
        assert_eq!(track_availability("batch", "Job", &failed), AvailabilityResultType::NotYetAvailable);

        let crd = json!({ "status": { "conditions": [
            { "type": "Established", "status": "True" },
            { "type": "NamesAccepted", "status": "True" }
        ] } });
        assert_eq!(
            track_availability("apiextensions.k8s.io", "CustomResourceDefinition", &crd),
            AvailabilityResultType::Available
        );
    }

    #[test]
    fn test_load_balancer_service_waits_for_ingress() {
        let mut svc = json!({ "spec": { "type": "LoadBalancer", "clusterIP": "10.0.0.1" }, "status": {} });
        assert_eq!(track_availability("", "Service", &svc), AvailabilityResultType::NotYetAvailable);
        svc["status"] = json!({ "loadBalancer": { "ingress": [ { "ip": "1.2.3.4" } ] } });
        assert_eq!(track_availability("", "Service", &svc), AvailabilityResultType::Available);
    }

    #[test]
    fn test_non_object_fails_to_track() {
        assert_eq!(
            track_availability("apps", "Deployment", &json!("oops")),
            AvailabilityResultType::FailedToTrack
        );
    }
}
