//! # Conditions
//!
//! Condition types shared by the hub and member custom resources, plus the
//! helpers used to read and update condition lists.

use serde::{Deserialize, Serialize};

/// Work condition: every manifest was applied
pub const WORK_CONDITION_APPLIED: &str = "Applied";
/// Work condition: every applied manifest is available
pub const WORK_CONDITION_AVAILABLE: &str = "Available";
/// Work condition: every manifest's diff has been reported (report-diff mode only)
pub const WORK_CONDITION_DIFF_REPORTED: &str = "DiffReported";

/// Status of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

/// Condition represents an observation of a resource's state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Generation of the object this condition was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Last transition time (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(
        r#type: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
        observed_generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: r#type.to_string(),
            status,
            observed_generation,
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    /// Two conditions are equivalent when they differ at most in their transition time
    #[must_use]
    pub fn is_equivalent(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.observed_generation == other.observed_generation
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Whether the condition of the given type is present, True, and computed for `generation`
///
/// A `None` generation accepts any observed generation.
pub fn is_condition_true(conditions: &[Condition], r#type: &str, generation: Option<i64>) -> bool {
    find_condition(conditions, r#type).is_some_and(|c| {
        c.status == ConditionStatus::True
            && (generation.is_none() || c.observed_generation == generation)
    })
}

/// Insert or replace a condition, keeping the previous transition time when
/// the status did not change
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            if existing.status == condition.status {
                condition
                    .last_transition_time
                    .clone_from(&existing.last_transition_time);
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Drop a condition by type
pub fn remove_condition(conditions: &mut Vec<Condition>, r#type: &str) {
    conditions.retain(|c| c.r#type != r#type);
}

/// Whether two condition lists match ignoring transition times and order
#[must_use]
pub fn conditions_equivalent(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len()
        && a.iter().all(|ca| {
            find_condition(b, &ca.r#type).is_some_and(|cb| ca.is_equivalent(cb))
        })
}
