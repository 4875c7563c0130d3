//! # Reconciler
//!
//! Drives one Work at a time to its desired state on the member cluster.
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the Work; a Work marked for deletion is finalized instead
//! 2. Ensure the cleanup finalizer and the member-side AppliedWork
//! 3. Process every manifest (apply or report diff)
//! 4. Release objects the Work no longer lists
//! 5. Write AppliedWork and Work status when they changed
//! 6. Record namespace associations for the parent placement
//! 7. Ask the rate limiter when to look again

pub mod cleanup;
pub mod reconcile;
pub mod status;
pub mod types;

pub use reconcile::reconcile;
pub use types::{ReconcileOutcome, Reconciler, ReconcilerError};
