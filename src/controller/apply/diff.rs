//! # Drift Detection
//!
//! Partial comparison between a manifest and the live object: only fields
//! set in the manifest are compared, so defaults and fields owned by other
//! writers never count as drift. Results are JSON pointers into the object.

use crate::constants::LAST_APPLIED_ANNOTATION;
use crate::crd::PatchDetail;
use serde_json::{Map, Value};

/// Top-level metadata fields that are part of the desired state
const COMPARED_METADATA_FIELDS: &[&str] = &["labels", "annotations"];

/// Differences between `desired` and `live`
///
/// Object keys are visited in `serde_json::Map` order, which is sorted, so
/// the result and any truncation of it are stable across passes.
pub fn compute_diffs(desired: &Value, live: &Value) -> Vec<PatchDetail> {
    let mut diffs = Vec::new();
    let (Some(desired), Some(live)) = (desired.as_object(), live.as_object()) else {
        diffs.push(detail(String::new(), Some(live), Some(desired)));
        return diffs;
    };

    for (key, desired_value) in desired {
        let path = format!("/{}", escape(key));
        match key.as_str() {
            "apiVersion" | "kind" | "status" => {}
            "metadata" => diff_metadata(desired_value, live.get(key), &path, &mut diffs),
            _ => diff_value(desired_value, live.get(key), path, &mut diffs),
        }
    }
    diffs
}

fn diff_metadata(desired: &Value, live: Option<&Value>, path: &str, diffs: &mut Vec<PatchDetail>) {
    let Some(desired) = desired.as_object() else {
        return;
    };
    let live = live.and_then(Value::as_object);
    for field in COMPARED_METADATA_FIELDS {
        let Some(desired_field) = desired.get(*field) else {
            continue;
        };
        let mut desired_field = desired_field.clone();
        if *field == "annotations" {
            if let Some(annotations) = desired_field.as_object_mut() {
                annotations.remove(LAST_APPLIED_ANNOTATION);
            }
        }
        diff_value(
            &desired_field,
            live.and_then(|m| m.get(*field)),
            format!("{path}/{field}"),
            diffs,
        );
    }
}

fn diff_value(desired: &Value, live: Option<&Value>, path: String, diffs: &mut Vec<PatchDetail>) {
    match (desired, live) {
        (_, None) => {
            if !desired.is_null() {
                diffs.push(detail(path, None, Some(desired)));
            }
        }
        (Value::Object(d), Some(Value::Object(l))) => diff_object(d, l, &path, diffs),
        (Value::Array(d), Some(Value::Array(l))) if d.len() == l.len() => {
            for (i, (dv, lv)) in d.iter().zip(l).enumerate() {
                diff_value(dv, Some(lv), format!("{path}/{i}"), diffs);
            }
        }
        (d, Some(l)) => {
            if !values_match(d, l) {
                diffs.push(detail(path, Some(l), Some(d)));
            }
        }
    }
}

fn diff_object(desired: &Map<String, Value>, live: &Map<String, Value>, path: &str, diffs: &mut Vec<PatchDetail>) {
    for (key, dv) in desired {
        diff_value(dv, live.get(key), format!("{path}/{}", escape(key)), diffs);
    }
}

/// Scalars compare by value; numbers compare numerically (1 == 1.0)
fn values_match(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Number(d), Value::Number(l)) => d.as_f64() == l.as_f64(),
        _ => desired == live,
    }
}

fn detail(path: String, live: Option<&Value>, desired: Option<&Value>) -> PatchDetail {
    PatchDetail {
        path: if path.is_empty() { "/".to_string() } else { path },
        value_in_member: live.map(render),
        value_in_hub: desired.map(render),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON pointer escaping (RFC 6901)
fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
