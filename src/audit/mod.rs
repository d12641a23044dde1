use crate::assets::AssetResult;
use crate::issue::Issue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Full audit record of one flow run. Persisted as `current-run.json` while
/// live, then archived under `runs/` on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub config: RunConfig,
    pub phases: Vec<PhaseAudit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetResult>,
    /// Issues still unresolved when the run ended
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_issues: Vec<Issue>,
    pub final_status: RunStatus,
    /// Path to the last-valid-document snapshot, set on abort
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}

impl AuditRun {
    pub fn new(config: RunConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            config,
            phases: Vec::new(),
            assets: Vec::new(),
            unresolved_issues: Vec::new(),
            final_status: RunStatus::InProgress,
            snapshot: None,
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.ended_at = Some(Utc::now());
        self.final_status = status;
    }
}

/// Snapshot of the effective configuration, for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub plan_file: PathBuf,
    pub template_file: PathBuf,
    pub output_root: PathBuf,
    pub max_remediation_rounds: u32,
    pub worker_timeout_secs: u64,
    pub max_parallel_workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Succeeded,
    /// Finished, but with recorded warnings (placeholders, empty fragments)
    Degraded,
    Aborted,
}

/// Per-phase record: task fan-out, integration outcome, and the remediation
/// rounds spent inside the phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseAudit {
    pub phase_id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskAudit>,
    pub outcome: PhaseOutcome,
    pub remediation_rounds: u32,
    /// Template version after this phase's integration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl PhaseAudit {
    pub fn new(phase_id: &str, name: &str) -> Self {
        Self {
            phase_id: phase_id.to_string(),
            name: name.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            tasks: Vec::new(),
            outcome: PhaseOutcome::InProgress,
            remediation_rounds: 0,
            template_version: None,
            issues: Vec::new(),
        }
    }

    pub fn finish(&mut self, outcome: PhaseOutcome) {
        self.ended_at = Some(Utc::now());
        self.outcome = outcome;
    }
}

/// One worker task inside a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAudit {
    pub task_id: String,
    pub marker: String,
    pub duration_secs: f64,
    pub outcome: TaskOutcome,
    /// Generation attempts, counting remediation re-runs
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed { message: String },
    TimedOut { seconds: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    InProgress,
    Completed,
    CompletedWithWarnings,
    Aborted { message: String },
    Skipped,
}

pub mod logger;
pub use logger::AuditLogger;
