//! Phase and flow-plan definitions.
//!
//! This module provides:
//! - `Phase` - one stage of the flow with its task set and join mode
//! - `TaskSpec`/`SpecPayload` - the per-worker generation request
//! - `FlowPlan` - the full plan file format (phases, marker registry
//!   declarations, asset specs) with JSON loading

use crate::assets::AssetSpec;
use crate::fragment::FragmentKind;
use crate::registry::MarkerDecl;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a phase's tasks are executed and joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Tasks run one after another
    Sequential,
    /// Tasks run concurrently and join at a wait-for-all barrier
    #[default]
    Parallel,
}

/// The payload handed to the fragment generator for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecPayload {
    /// Free-form instructions for the generator; never inspected here
    pub instructions: String,
    /// Symbols (class/function names) the fragment promises to define;
    /// checked by the validator against the merged text
    #[serde(default)]
    pub declared_symbols: Vec<String>,
    /// Expected content kind for the target marker
    #[serde(default)]
    pub kind: FragmentKind,
}

/// One unit of fragment generation within a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task id, unique within the flow
    pub id: String,
    /// Target marker token
    pub marker: String,
    /// Generation request payload
    pub payload: SpecPayload,
    /// Application priority when several fragments share a marker;
    /// lower applies first
    #[serde(default)]
    pub priority: u32,
}

/// Represents a single stage of the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Phase id (e.g., "engine", "entity")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Join mode for the task set
    #[serde(default)]
    pub join_mode: JoinMode,
    /// Ids of phases that must reach terminal status first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Worker tasks spawned when this phase starts
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl Phase {
    pub fn new(id: &str, name: &str, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            join_mode: JoinMode::default(),
            depends_on,
            tasks: Vec::new(),
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskSpec>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_join_mode(mut self, join_mode: JoinMode) -> Self {
        self.join_mode = join_mode;
        self
    }

    /// Find the task spec that targets the given marker.
    pub fn task_for_marker(&self, marker: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.marker == marker)
    }
}

/// The full plan file: phases, marker registry declarations, and asset
/// specs. This is the pure boundary supplying the initial inputs; nothing
/// in the engine mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPlan {
    /// List of phases in declaration order
    pub phases: Vec<Phase>,
    /// Static marker registry declarations
    #[serde(default)]
    pub markers: Vec<MarkerDecl>,
    /// Asset acquisition requests
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
}

impl FlowPlan {
    /// Load a plan from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;

        let plan: FlowPlan = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse plan JSON: {}", path.display()))?;

        Ok(plan)
    }

    /// Save a plan to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize plan to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write plan file: {}", path.display()))?;

        Ok(())
    }

    /// Get a specific phase by id.
    pub fn get_phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }
}
