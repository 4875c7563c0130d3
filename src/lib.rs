//! Fleet Work Applier Library
//!
//! Member-cluster agent of a multi-cluster fleet: it applies the manifests
//! of hub Work objects to the member cluster, tracks their availability,
//! and reports results back to the hub.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
