//! Typed error hierarchy for the Weaver engine.
//!
//! Three top-level enums cover the three subsystems:
//! - `FlowError` - scheduler and flow-level failures
//! - `IntegrationError` - splice-pass failures
//! - `AssetError` - asset search, filtering, and download failures
//!
//! Per the propagation policy, failures inside a phase are captured as
//! `Issue`s and never thrown past the scheduler boundary; the variants here
//! cover startup validation and I/O edges.

use crate::fragment::FragmentKind;
use thiserror::Error;

/// Errors from the flow scheduler and registry validation.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Cycle detected in phase graph. Involved phases: {phases:?}")]
    SchedulerDeadlock { phases: Vec<String> },

    #[error("Duplicate phase id: {0}")]
    DuplicatePhase(String),

    #[error("Phase {phase} depends on unknown phase {dependency}")]
    UnknownDependency { phase: String, dependency: String },

    #[error("Duplicate marker declaration: {0}")]
    DuplicateMarker(String),

    #[error("Marker {marker} declares unknown owner phase {phase}")]
    UnknownOwnerPhase { marker: String, phase: String },

    #[error("Marker {0} is declared in the registry but absent from the base template")]
    MarkerAbsentFromTemplate(String),

    #[error("Task {task} targets marker {marker} which is not declared in the registry")]
    UndeclaredTarget { task: String, marker: String },

    #[error("Task {task} in phase {phase} targets marker {marker} owned by phase {owner}")]
    CrossPhaseTarget {
        task: String,
        phase: String,
        marker: String,
        owner: String,
    },

    #[error("Task {task} declares kind {actual:?} for marker {marker}, registry expects {expected:?}")]
    TargetKindMismatch {
        task: String,
        marker: String,
        expected: FragmentKind,
        actual: FragmentKind,
    },

    #[error("Marker {0} occurs more than once in the base template")]
    MarkerRepeatedInTemplate(String),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single integration (splice) pass.
///
/// Missing markers and unordered duplicates inside a pass are recorded as
/// issues on the `IntegrationResult`, not returned as `Err`; only whole-pass
/// preconditions fail the call.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Template is frozen; no further integration is allowed")]
    Frozen,

    #[error("Marker {marker} was already consumed in a previous pass (template version {version})")]
    AlreadyIntegrated { marker: String, version: u64 },

    #[error("Marker {0} not found in template")]
    MissingMarker(String),
}

/// Errors from fragment generation (the external collaborator).
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generator failed for marker {marker}: {message}")]
    Failed { marker: String, message: String },

    #[error("Worker task {task} timed out after {seconds}s")]
    Timeout { task: String, seconds: u64 },

    #[error("Generator produced no usable output for marker {marker}")]
    EmptyOutput { marker: String },
}

/// Errors from the asset resolver subsystem.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Asset search request failed: {0}")]
    Search(String),

    #[error("Failed to download candidate {id} from {url}: {reason}")]
    Download {
        id: String,
        url: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AssetError {
    fn from(err: reqwest::Error) -> Self {
        AssetError::Search(err.to_string())
    }
}
