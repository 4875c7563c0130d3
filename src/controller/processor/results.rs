//! # Processing Results
//!
//! Outcome tags recorded for every manifest in a reconciliation pass.
//! Their string forms double as condition reasons and feed the processing
//! fingerprint, so they must stay stable.

use sha2::{Digest, Sha256};

/// Result of the apply step for one manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyResultType {
    Applied,
    FailedToApply,
    /// If-no-diff take-over found differences
    FailedToTakeOver,
    /// Object exists, is not managed by the agent, and the policy forbids taking it over
    NotTakenOver,
    DecodingErred,
    FoundGenerateName,
    /// Another manifest in the same Work targets the same object
    Duplicated,
    FailedToFindObjInMemberCluster,
    FailedToResolveResource,
    /// Report-diff mode: nothing is applied
    NoApplyPerformed,
}

impl ApplyResultType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyResultType::Applied => "Applied",
            ApplyResultType::FailedToApply => "FailedToApply",
            ApplyResultType::FailedToTakeOver => "FailedToTakeOver",
            ApplyResultType::NotTakenOver => "NotTakenOver",
            ApplyResultType::DecodingErred => "DecodingErred",
            ApplyResultType::FoundGenerateName => "FoundGenerateName",
            ApplyResultType::Duplicated => "Duplicated",
            ApplyResultType::FailedToFindObjInMemberCluster => "FailedToFindObjInMemberCluster",
            ApplyResultType::FailedToResolveResource => "FailedToResolveResource",
            ApplyResultType::NoApplyPerformed => "NoApplyPerformed",
        }
    }

    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyResultType::Applied)
    }
}

/// Result of the availability check for one manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvailabilityResultType {
    Available,
    NotYetAvailable,
    /// The agent has no readiness rule for this kind
    NotTrackable,
    FailedToTrack,
    /// Not evaluated (apply failed or report-diff mode)
    Skipped,
}

impl AvailabilityResultType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityResultType::Available => "Available",
            AvailabilityResultType::NotYetAvailable => "NotYetAvailable",
            AvailabilityResultType::NotTrackable => "NotTrackable",
            AvailabilityResultType::FailedToTrack => "FailedToTrack",
            AvailabilityResultType::Skipped => "Skipped",
        }
    }

    /// Available or untrackable; both count towards Work availability
    #[must_use]
    pub fn counts_as_available(&self) -> bool {
        matches!(
            self,
            AvailabilityResultType::Available | AvailabilityResultType::NotTrackable
        )
    }
}

/// Result of the diff-report step for one manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffReportResultType {
    FoundDiff,
    NoDiffFound,
    FailedToReportDiff,
    /// Enforcing modes do not report diffs
    Skipped,
}

impl DiffReportResultType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffReportResultType::FoundDiff => "FoundDiff",
            DiffReportResultType::NoDiffFound => "NoDiffFound",
            DiffReportResultType::FailedToReportDiff => "FailedToReportDiff",
            DiffReportResultType::Skipped => "Skipped",
        }
    }

    #[must_use]
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            DiffReportResultType::FoundDiff | DiffReportResultType::NoDiffFound
        )
    }
}

/// Hash of the ordered (apply, availability, diff-report) tuples of a pass
///
/// Two passes with the same fingerprint observed nothing new.
pub fn processing_fingerprint<I>(results: I) -> Result<String, serde_json::Error>
where
    I: IntoIterator<
        Item = (
            ApplyResultType,
            AvailabilityResultType,
            DiffReportResultType,
        ),
    >,
{
    let tuples: Vec<[&'static str; 3]> = results
        .into_iter()
        .map(|(apply, availability, diff)| [apply.as_str(), availability.as_str(), diff.as_str()])
        .collect();
    let encoded = serde_json::to_vec(&tuples)?;
    let digest = Sha256::digest(&encoded);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        let a = (
            ApplyResultType::Applied,
            AvailabilityResultType::Available,
            DiffReportResultType::Skipped,
        );
        let b = (
            ApplyResultType::FailedToApply,
            AvailabilityResultType::Skipped,
            DiffReportResultType::Skipped,
        );
        let ab = processing_fingerprint(vec![a, b]).unwrap();
        let ba = processing_fingerprint(vec![b, a]).unwrap();
        assert_ne!(ab, ba);
        assert_eq!(ab, processing_fingerprint(vec![a, b]).unwrap());
        assert_eq!(ab.len(), 64);
    }
}
