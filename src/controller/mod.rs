//! # Controller
//!
//! Core modules of the work applier.
//!
//! - `apply`: member-cluster client, apply strategies and drift detection
//! - `associations`: namespace association tracking per placement
//! - `availability`: per-kind readiness rules
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `priority`: event prioritization and the keyed priority queue
//! - `processor`: per-manifest processing and Work status aggregation
//! - `ratelimiter`: requeue delays for successful passes
//! - `reconciler`: end-to-end reconciliation of one Work
//! - `server`: HTTP server for metrics and health checks
//! - `takeover`: ownership arbitration for pre-existing objects

pub mod apply;
pub mod associations;
pub mod availability;
pub mod backoff;
pub mod priority;
pub mod processor;
pub mod ratelimiter;
pub mod reconciler;
pub mod server;
pub mod takeover;
