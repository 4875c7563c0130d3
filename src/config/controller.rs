//! # Controller Configuration
//!
//! Agent-level settings loaded from environment variables.

use crate::constants::MEMBER_NAMESPACE_PREFIX;
use std::time::Duration;

/// Agent-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Name of the member cluster this agent serves
    pub member_cluster_name: String,
    /// Hub namespace holding this member's Work objects
    /// Defaults to `fleet-member-<member_cluster_name>`
    pub hub_namespace: String,
    /// Path to the hub kubeconfig
    /// When unset the default client configuration is used for the hub as well
    pub hub_kubeconfig: Option<String>,
    /// Number of concurrent reconciliation workers
    pub workers: usize,
    /// Requeues served with the fixed fast delay before exponential backoff kicks in
    pub max_fast_attempts: u32,
    /// Fixed requeue delay (seconds)
    pub fast_delay_secs: u64,
    /// Exponential backoff base
    pub exponential_base: f64,
    /// Maximum requeue delay (seconds)
    pub max_delay_secs: u64,
    /// Works younger than this are always handled at high priority (seconds)
    pub fresh_work_threshold_secs: u64,
    /// Maximum namespace association labels surfaced on the member record
    pub max_namespace_labels: usize,
    /// Bound on a single reconciliation (seconds)
    pub reconcile_timeout_secs: u64,
    /// Re-fetch attempts after a 409 Conflict on a status write
    pub status_conflict_retries: u32,
    /// Watch stream restart delay after errors or stream end (seconds)
    pub watch_restart_delay_secs: u64,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        let member_cluster_name = "member".to_string();
        Self {
            hub_namespace: format!("{MEMBER_NAMESPACE_PREFIX}{member_cluster_name}"),
            member_cluster_name,
            hub_kubeconfig: None,
            workers: DEFAULT_WORKERS,
            max_fast_attempts: DEFAULT_MAX_FAST_ATTEMPTS,
            fast_delay_secs: DEFAULT_FAST_DELAY_SECS,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
            fresh_work_threshold_secs: DEFAULT_FRESH_WORK_THRESHOLD_SECS,
            max_namespace_labels: DEFAULT_MAX_NAMESPACE_LABELS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            status_conflict_retries: DEFAULT_STATUS_CONFLICT_RETRIES,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            enable_metrics: true,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        let member_cluster_name = env_var_or_default_str("MEMBER_CLUSTER_NAME", "member");
        let hub_namespace = std::env::var("HUB_NAMESPACE")
            .ok()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| format!("{MEMBER_NAMESPACE_PREFIX}{member_cluster_name}"));
        Self {
            member_cluster_name,
            hub_namespace,
            hub_kubeconfig: std::env::var("HUB_KUBECONFIG")
                .ok()
                .filter(|p| !p.is_empty()),
            workers: env_var_or_default("WORK_APPLIER_WORKERS", DEFAULT_WORKERS).max(1),
            max_fast_attempts: env_var_or_default(
                "REQUEUE_MAX_FAST_ATTEMPTS",
                DEFAULT_MAX_FAST_ATTEMPTS,
            ),
            fast_delay_secs: env_var_or_default("REQUEUE_FAST_DELAY_SECS", DEFAULT_FAST_DELAY_SECS),
            exponential_base: env_var_or_default(
                "REQUEUE_EXPONENTIAL_BASE",
                DEFAULT_EXPONENTIAL_BASE,
            ),
            max_delay_secs: env_var_or_default("REQUEUE_MAX_DELAY_SECS", DEFAULT_MAX_DELAY_SECS),
            fresh_work_threshold_secs: env_var_or_default(
                "PRIORITY_FRESH_WORK_THRESHOLD_SECS",
                DEFAULT_FRESH_WORK_THRESHOLD_SECS,
            ),
            max_namespace_labels: env_var_or_default(
                "MAX_NAMESPACE_LABELS",
                DEFAULT_MAX_NAMESPACE_LABELS,
            ),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            status_conflict_retries: env_var_or_default(
                "STATUS_CONFLICT_RETRIES",
                DEFAULT_STATUS_CONFLICT_RETRIES,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            enable_metrics: env_var_or_default_bool("ENABLE_METRICS", true),
        }
    }

    /// Get fast requeue delay duration
    pub fn fast_delay(&self) -> Duration {
        Duration::from_secs(self.fast_delay_secs)
    }

    /// Get maximum requeue delay duration
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    /// Get fresh-work priority threshold duration
    pub fn fresh_work_threshold(&self) -> Duration {
        Duration::from_secs(self.fresh_work_threshold_secs)
    }

    /// Get reconciliation timeout duration
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hub_namespace_follows_member_name() {
        let config = ControllerConfig::default();
        assert_eq!(config.hub_namespace, "fleet-member-member");
        assert_eq!(config.fast_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_var_or_default_falls_back_on_parse_error() {
        // Key is never set by the test harness
        let value: u64 = env_var_or_default("FLEET_WORK_APPLIER_TEST_UNSET_KEY", 42);
        assert_eq!(value, 42);
    }
}
