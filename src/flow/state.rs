//! Run-level result types returned by the executor.

use crate::assets::AssetResult;
use crate::audit::RunStatus;
use crate::flow::scheduler::PhaseStatus;
use crate::integrate::AppliedFragment;
use crate::issue::Issue;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one phase, kept for the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRunResult {
    pub phase_id: String,
    pub status: PhaseStatus,
    /// Fragments applied during this phase, in application order
    pub applied: Vec<AppliedFragment>,
    /// Issues raised during the phase, resolved or not
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    pub remediation_rounds: u32,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

/// What a completed (or aborted) run hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub status: RunStatus,
    pub phases: Vec<PhaseRunResult>,
    /// Final document location; on abort this is the last valid snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
    /// Issues that were never resolved, with their remediation history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetResult>,
    pub template_version: u64,
}

impl FinalReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded | RunStatus::Degraded)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success_includes_degraded() {
        let report = FinalReport {
            status: RunStatus::Degraded,
            phases: Vec::new(),
            document: Some(PathBuf::from("out/index.html")),
            snapshot: None,
            unresolved_issues: Vec::new(),
            assets: Vec::new(),
            template_version: 3,
        };
        assert!(report.succeeded());

        let aborted = FinalReport {
            status: RunStatus::Aborted,
            ..report
        };
        assert!(!aborted.succeeded());
    }

    #[test]
    fn test_phase_result_duration_serializes_as_seconds() {
        let result = PhaseRunResult {
            phase_id: "engine".to_string(),
            status: PhaseStatus::Completed { template_version: 1 },
            applied: Vec::new(),
            issues: Vec::new(),
            remediation_rounds: 0,
            duration: Duration::from_millis(2500),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], 2.5);

        let back: PhaseRunResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(2500));
    }
}
