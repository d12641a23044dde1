//! Phase scheduler: execution order and per-phase status over the graph.
//!
//! The scheduler computes execution waves - groups of phases whose
//! dependencies are satisfied and can therefore run concurrently - and
//! tracks each phase through its lifecycle. When a phase aborts, every
//! transitive dependent is marked skipped so the final report accounts for
//! the whole plan.

use crate::errors::FlowError;
use crate::flow::builder::{FlowBuilder, PhaseGraph, PhaseIndex};
use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Status of a phase in the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Waiting to run
    #[default]
    Pending,
    /// Currently running
    Running,
    /// Completed; fragments integrated at the recorded template version
    Completed { template_version: u64 },
    /// Aborted with unresolvable issues
    Aborted { error: String },
    /// Skipped because an upstream phase aborted
    Skipped,
}

impl PhaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Aborted { .. } | Self::Skipped
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// A phase with its current status.
#[derive(Debug, Clone)]
pub struct PhaseNode {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub index: PhaseIndex,
}

impl PhaseNode {
    fn new(phase: Phase, index: PhaseIndex) -> Self {
        Self {
            phase,
            status: PhaseStatus::Pending,
            index,
        }
    }
}

#[derive(Debug)]
pub struct FlowScheduler {
    graph: PhaseGraph,
    nodes: Vec<PhaseNode>,
    completed: HashSet<PhaseIndex>,
    aborted: HashSet<PhaseIndex>,
}

impl FlowScheduler {
    /// Build a scheduler from the plan's phase list.
    pub fn from_phases(phases: &[Phase]) -> Result<Self, FlowError> {
        let graph = FlowBuilder::new(phases.to_vec()).build()?;

        let nodes: Vec<PhaseNode> = graph
            .phases()
            .iter()
            .enumerate()
            .map(|(i, p)| PhaseNode::new(p.clone(), i))
            .collect();

        Ok(Self {
            graph,
            nodes,
            completed: HashSet::new(),
            aborted: HashSet::new(),
        })
    }

    pub fn phase_count(&self) -> usize {
        self.graph.len()
    }

    pub fn nodes(&self) -> &[PhaseNode] {
        &self.nodes
    }

    fn get_node_mut(&mut self, id: &str) -> Option<&mut PhaseNode> {
        let index = self.graph.get_index(id)?;
        self.nodes.get_mut(index)
    }

    /// Compute execution waves: each wave is a set of phase ids runnable
    /// concurrently once every earlier wave has completed.
    pub fn compute_waves(&self) -> Vec<Vec<String>> {
        let mut waves = Vec::new();
        let mut completed: HashSet<PhaseIndex> = HashSet::new();

        loop {
            let ready: Vec<String> = self
                .graph
                .phases()
                .iter()
                .enumerate()
                .filter_map(|(i, phase)| {
                    if completed.contains(&i) {
                        return None;
                    }
                    if self.graph.dependencies_satisfied(i, &completed) {
                        Some(phase.id.clone())
                    } else {
                        None
                    }
                })
                .collect();

            if ready.is_empty() {
                break;
            }

            for id in &ready {
                if let Some(idx) = self.graph.get_index(id) {
                    completed.insert(idx);
                }
            }

            waves.push(ready);
        }

        waves
    }

    /// Phases whose dependencies are satisfied and have not started.
    pub fn ready_phases(&self) -> Vec<&PhaseNode> {
        self.nodes
            .iter()
            .filter(|node| {
                matches!(node.status, PhaseStatus::Pending)
                    && self.graph.dependencies_satisfied(node.index, &self.completed)
            })
            .collect()
    }

    pub fn mark_running(&mut self, id: &str) {
        if let Some(node) = self.get_node_mut(id) {
            node.status = PhaseStatus::Running;
        }
    }

    pub fn mark_completed(&mut self, id: &str, template_version: u64) {
        if let Some(idx) = self.graph.get_index(id) {
            if let Some(node) = self.nodes.get_mut(idx) {
                node.status = PhaseStatus::Completed { template_version };
            }
            self.completed.insert(idx);
        }
    }

    /// Mark a phase as aborted and skip every transitive dependent.
    pub fn mark_aborted(&mut self, id: &str, error: &str) {
        if let Some(idx) = self.graph.get_index(id) {
            if let Some(node) = self.nodes.get_mut(idx) {
                node.status = PhaseStatus::Aborted {
                    error: error.to_string(),
                };
            }
            self.aborted.insert(idx);
            self.skip_dependents(idx);
        }
    }

    fn skip_dependents(&mut self, failed_idx: PhaseIndex) {
        let dependents: Vec<PhaseIndex> = self.graph.dependents(failed_idx).to_vec();
        for dep_idx in dependents {
            if let Some(node) = self.nodes.get_mut(dep_idx) {
                if !node.status.is_terminal() {
                    node.status = PhaseStatus::Skipped;
                    self.aborted.insert(dep_idx);
                    self.skip_dependents(dep_idx);
                }
            }
        }
    }

    /// Skip every phase that has not reached a terminal state. Called when
    /// a fatal issue aborts the whole flow.
    pub fn skip_remaining(&mut self) {
        for node in &mut self.nodes {
            if !node.status.is_terminal() {
                node.status = PhaseStatus::Skipped;
                self.aborted.insert(node.index);
            }
        }
    }

    pub fn all_complete(&self) -> bool {
        self.nodes.iter().all(|n| n.status.is_terminal())
    }

    pub fn all_success(&self) -> bool {
        self.nodes.iter().all(|n| n.status.is_success())
    }

    pub fn aborted_count(&self) -> usize {
        self.aborted.len()
    }
}
