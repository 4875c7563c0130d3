//! # Fleet Work Applier
//!
//! Member-cluster agent that applies fleet Work bundles from the hub.
//!
//! ## Overview
//!
//! 1. **Watches Work objects** in the member's reserved hub namespace
//! 2. **Prioritizes events** so new and changed Works are handled first
//! 3. **Applies manifests** with client-side or server-side apply, or only
//!    reports drift
//! 4. **Arbitrates ownership** of objects that already exist on the member
//! 5. **Tracks availability** of applied objects and reports it in Work status
//! 6. **Records namespace associations** per placement on the member record
//!
//! Configuration comes from environment variables; see `config`.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    fleet_work_applier::runtime::run().await
}
