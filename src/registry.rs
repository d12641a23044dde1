//! Static marker registry.
//!
//! Every marker token is declared once, with its owning phase and expected
//! content kind. The registry is validated before any generation runs, so
//! missing or duplicate markers surface as startup configuration errors
//! instead of failing deep inside string replacement.

use crate::errors::FlowError;
use crate::fragment::FragmentKind;
use crate::phase::Phase;
use crate::template::Template;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single marker declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDecl {
    /// The marker token as it appears in the template (exact match)
    pub marker: String,
    /// Id of the phase whose tasks may target this marker
    pub owner_phase: String,
    /// Expected content kind
    #[serde(default)]
    pub kind: FragmentKind,
    /// Whether the marker must be consumed for validation to pass
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// The validated marker table.
#[derive(Debug, Clone)]
pub struct MarkerRegistry {
    decls: HashMap<String, MarkerDecl>,
    /// Declaration order, for deterministic reporting
    order: Vec<String>,
}

impl MarkerRegistry {
    /// Build a registry from declarations, rejecting duplicates.
    pub fn from_decls(decls: Vec<MarkerDecl>) -> Result<Self, FlowError> {
        let mut map = HashMap::new();
        let mut order = Vec::with_capacity(decls.len());

        for decl in decls {
            if map.contains_key(&decl.marker) {
                return Err(FlowError::DuplicateMarker(decl.marker));
            }
            order.push(decl.marker.clone());
            map.insert(decl.marker.clone(), decl);
        }

        Ok(Self { decls: map, order })
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.decls.contains_key(marker)
    }

    pub fn get(&self, marker: &str) -> Option<&MarkerDecl> {
        self.decls.get(marker)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Markers that must be consumed, in declaration order.
    pub fn required_markers(&self) -> impl Iterator<Item = &MarkerDecl> {
        self.order
            .iter()
            .filter_map(|m| self.decls.get(m))
            .filter(|d| d.required)
    }

    /// Validate the registry against the base template and phase graph.
    ///
    /// Checks, in order:
    /// - every declared owner phase exists
    /// - every declared marker occurs exactly once in the base template
    /// - every task target is a declared marker, owned by the task's own
    ///   phase, with a matching content kind
    pub fn validate(&self, template: &Template, phases: &[Phase]) -> Result<(), FlowError> {
        for marker in &self.order {
            let decl = &self.decls[marker];
            if !phases.iter().any(|p| p.id == decl.owner_phase) {
                return Err(FlowError::UnknownOwnerPhase {
                    marker: decl.marker.clone(),
                    phase: decl.owner_phase.clone(),
                });
            }
            if !template.contains_marker(&decl.marker) {
                return Err(FlowError::MarkerAbsentFromTemplate(decl.marker.clone()));
            }
            if template.marker_occurrences(&decl.marker) > 1 {
                return Err(FlowError::MarkerRepeatedInTemplate(decl.marker.clone()));
            }
        }

        for phase in phases {
            for task in &phase.tasks {
                let decl = self.get(&task.marker).ok_or_else(|| FlowError::UndeclaredTarget {
                    task: task.id.clone(),
                    marker: task.marker.clone(),
                })?;
                // A task splicing into another phase's marker would consume
                // it before the owner phase runs
                if decl.owner_phase != phase.id {
                    return Err(FlowError::CrossPhaseTarget {
                        task: task.id.clone(),
                        phase: phase.id.clone(),
                        marker: task.marker.clone(),
                        owner: decl.owner_phase.clone(),
                    });
                }
                if decl.kind != task.payload.kind {
                    return Err(FlowError::TargetKindMismatch {
                        task: task.id.clone(),
                        marker: task.marker.clone(),
                        expected: decl.kind,
                        actual: task.payload.kind,
                    });
                }
            }
        }

        Ok(())
    }
}
