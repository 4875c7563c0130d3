//! # CRD Generator
//!
//! Generates CustomResourceDefinition YAML for the Work API types.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/work-api.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use fleet_work_applier::crd::{AppliedWork, InternalMemberCluster, MemberCluster, Work};
use kube::core::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [
        Work::crd(),
        AppliedWork::crd(),
        MemberCluster::crd(),
        InternalMemberCluster::crd(),
    ];
    let documents = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    print!("{}", documents.join("---\n"));
    Ok(())
}
