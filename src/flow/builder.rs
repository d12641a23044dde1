//! Dependency graph construction for flow phases.
//!
//! Builds a directed acyclic graph from the plan's phase list and validates
//! it up front: duplicate ids, unknown dependencies, and cycles are all
//! rejected before anything runs.

use crate::errors::FlowError;
use crate::phase::Phase;

/// Index into the phase list.
pub type PhaseIndex = usize;

/// A validated directed acyclic graph of phases.
#[derive(Debug)]
pub struct PhaseGraph {
    phases: Vec<Phase>,
    index_map: std::collections::HashMap<String, PhaseIndex>,
    /// index -> phases that depend on it
    forward_edges: Vec<Vec<PhaseIndex>>,
    /// index -> phases it depends on
    reverse_edges: Vec<Vec<PhaseIndex>>,
}

impl PhaseGraph {
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get_phase(&self, index: PhaseIndex) -> Option<&Phase> {
        self.phases.get(index)
    }

    pub fn get_index(&self, id: &str) -> Option<PhaseIndex> {
        self.index_map.get(id).copied()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Phases that depend on the given phase.
    pub fn dependents(&self, index: PhaseIndex) -> &[PhaseIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Phases the given phase depends on.
    pub fn dependencies(&self, index: PhaseIndex) -> &[PhaseIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    pub fn root_phases(&self) -> Vec<PhaseIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn dependencies_satisfied(
        &self,
        index: PhaseIndex,
        completed: &std::collections::HashSet<PhaseIndex>,
    ) -> bool {
        self.dependencies(index)
            .iter()
            .all(|dep| completed.contains(dep))
    }
}

/// Builder for phase graphs.
pub struct FlowBuilder {
    phases: Vec<Phase>,
}

impl FlowBuilder {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    /// Build and validate the graph. Dependencies must reference existing
    /// phases; cycles are rejected.
    pub fn build(self) -> Result<PhaseGraph, FlowError> {
        let mut index_map = std::collections::HashMap::new();
        for (i, phase) in self.phases.iter().enumerate() {
            if index_map.insert(phase.id.clone(), i).is_some() {
                return Err(FlowError::DuplicatePhase(phase.id.clone()));
            }
        }

        let mut forward_edges: Vec<Vec<PhaseIndex>> = vec![Vec::new(); self.phases.len()];
        let mut reverse_edges: Vec<Vec<PhaseIndex>> = vec![Vec::new(); self.phases.len()];

        for (to_idx, phase) in self.phases.iter().enumerate() {
            for dep in &phase.depends_on {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| FlowError::UnknownDependency {
                            phase: phase.id.clone(),
                            dependency: dep.clone(),
                        })?;
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = PhaseGraph {
            phases: self.phases,
            index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&graph)?;
        Ok(graph)
    }

    /// Kahn's algorithm; any node left with positive in-degree sits on a
    /// cycle.
    fn validate_no_cycles(graph: &PhaseGraph) -> Result<(), FlowError> {
        let mut in_degree: Vec<usize> = graph.reverse_edges.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<PhaseIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;
            for &dependent in graph.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != graph.len() {
            let phases: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| graph.get_phase(i).map(|p| p.id.clone()))
                .collect();
            return Err(FlowError::SchedulerDeadlock { phases });
        }

        Ok(())
    }
}
