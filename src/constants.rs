//! # Constants
//!
//! Shared constants used throughout the work applier.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Domain prefix shared by fleet labels, annotations and finalizers
pub const FLEET_PREFIX: &str = "kubernetes-fleet.io";

/// Label on a Work whose value names the placement request (CRP) that produced it
pub const PARENT_PLACEMENT_LABEL: &str = "kubernetes-fleet.io/parent-CRP";

/// Prefix of the member label that records which placement owns a namespace
/// (`kubernetes-fleet.io/namespace-<namespace-name>`)
pub const NAMESPACE_LABEL_PREFIX: &str = "kubernetes-fleet.io/namespace-";

/// Finalizer the applier places on Work objects so member cleanup runs before removal
pub const WORK_FINALIZER: &str = "kubernetes-fleet.io/work-cleanup";

/// Annotation holding the last manifest applied with client-side apply
pub const LAST_APPLIED_ANNOTATION: &str = "kubernetes-fleet.io/last-applied-configuration";

/// Field manager used for server-side apply and status writes
pub const FIELD_MANAGER: &str = "work-api-agent";

/// Prefix of the hub namespace reserved for a member cluster
pub const MEMBER_NAMESPACE_PREFIX: &str = "fleet-member-";

/// Namespace given to namespaced manifests that do not set one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default number of concurrent reconciliation workers
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of requeues served with the fixed fast delay
pub const DEFAULT_MAX_FAST_ATTEMPTS: u32 = 3;

/// Default fixed requeue delay (seconds)
pub const DEFAULT_FAST_DELAY_SECS: u64 = 5;

/// Default exponential backoff base
pub const DEFAULT_EXPONENTIAL_BASE: f64 = 1.5;

/// Default maximum requeue delay (seconds)
pub const DEFAULT_MAX_DELAY_SECS: u64 = 300;

/// Lower bound for the fast delay and the max delay (seconds)
pub const MIN_REQUEUE_DELAY_SECS: u64 = 5;

/// Upper bound for the max delay (seconds)
pub const MAX_REQUEUE_DELAY_SECS: u64 = 3600;

/// Works younger than this are always handled at high priority (seconds)
pub const DEFAULT_FRESH_WORK_THRESHOLD_SECS: u64 = 300;

/// Default number of namespace association labels surfaced on a member
pub const DEFAULT_MAX_NAMESPACE_LABELS: usize = 20;

/// Default bound on a single reconciliation (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Default number of re-fetch attempts after a 409 Conflict on a status write
pub const DEFAULT_STATUS_CONFLICT_RETRIES: u32 = 5;

/// Default delay before restarting the Work watch stream after it ends or fails (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Minimum error backoff (seconds)
pub const ERROR_BACKOFF_MIN_SECS: u64 = 1;

/// Maximum error backoff (seconds)
pub const ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Maximum number of diff paths recorded per manifest in Work status
pub const MAX_DIFF_DETAILS_PER_MANIFEST: usize = 50;
