//! Template integrator: the single splice pass.
//!
//! The integrator is the only mutator of the template. A pass takes the
//! fragment set produced by a phase, locates each target marker by exact
//! match, re-indents fragment bodies to the marker line's prefix, and
//! replaces the marker. Markers are consumed on application, so the
//! transform is one-shot: a fragment targeting an already-consumed marker
//! fails the whole pass.
//!
//! Ordering is determined solely by marker position in the document and by
//! declared fragment priority, never by worker completion order, so the
//! output is independent of scheduling jitter.

use crate::errors::IntegrationError;
use crate::fragment::Fragment;
use crate::issue::{Issue, IssueCategory};
use crate::template::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One substitution record in the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFragment {
    pub marker: String,
    pub producer: String,
    /// Position in the overall application order (monotonic per run)
    pub order: usize,
    pub priority: u32,
    pub applied_at: DateTime<Utc>,
}

/// Outcome of one splice pass. Retained in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationResult {
    /// Template version after the pass
    pub version: u64,
    /// Applied-fragment log, in application order
    pub applied: Vec<AppliedFragment>,
    /// Markers still unconsumed after the pass
    pub unresolved_markers: Vec<String>,
    /// Issues raised during the pass (missing markers, unordered
    /// duplicates, empty fragments)
    pub issues: Vec<Issue>,
    /// Resulting template content snapshot
    pub snapshot: String,
}

impl IntegrationResult {
    /// Check whether the pass raised any blocking issue.
    pub fn ok(&self) -> bool {
        self.issues.iter().all(|i| !i.severity.is_blocking())
    }
}

/// Splice a fragment set into the template.
///
/// Deterministic given an identical fragment set and priorities: markers are
/// processed in document order, fragments per marker in ascending declared
/// priority. Multiple fragments on one marker concatenate (never overwrite);
/// equal priorities on a shared marker raise a fatal `duplicate-unordered`
/// issue and leave that marker unconsumed.
///
/// Errors fail the whole pass without mutating the template: `Frozen` when
/// the template is past final validation, `AlreadyIntegrated` when any
/// fragment targets a marker consumed by a previous pass.
pub fn integrate(
    template: &mut Template,
    fragments: &[Fragment],
    order_base: usize,
) -> Result<IntegrationResult, IntegrationError> {
    if template.is_frozen() {
        return Err(IntegrationError::Frozen);
    }
    for fragment in fragments {
        if template.was_consumed(&fragment.marker) {
            return Err(IntegrationError::AlreadyIntegrated {
                marker: fragment.marker.clone(),
                version: template.version(),
            });
        }
    }

    let mut by_marker: BTreeMap<&str, Vec<&Fragment>> = BTreeMap::new();
    for fragment in fragments {
        by_marker.entry(&fragment.marker).or_default().push(fragment);
    }

    let mut issues = Vec::new();
    let mut applied = Vec::new();
    let mut order = order_base;

    // Process markers in document order so the audit log is stable.
    let marker_order: Vec<String> = template.markers().to_vec();
    for marker in &marker_order {
        let Some(group) = by_marker.remove(marker.as_str()) else {
            continue;
        };
        let mut group = group;
        group.sort_by_key(|f| f.priority);

        if has_duplicate_priority(&group) {
            let producers: Vec<&str> = group.iter().map(|f| f.producer.as_str()).collect();
            warn!(marker = %marker, ?producers, "fragments share a priority with no total order");
            issues.push(
                Issue::new(
                    IssueCategory::DuplicateUnordered,
                    &format!(
                        "Fragments {:?} target {} with duplicate priorities",
                        producers, marker
                    ),
                )
                .with_marker(marker),
            );
            continue;
        }

        let indent = template.marker_indent(marker).unwrap_or_default();
        let mut bodies = Vec::new();
        for fragment in &group {
            if fragment.is_empty() {
                issues.push(
                    Issue::new(
                        IssueCategory::EmptyFragment,
                        &format!("Fragment from {} for {} is empty", fragment.producer, marker),
                    )
                    .with_marker(marker)
                    .with_producer(&fragment.producer),
                );
                continue;
            }
            bodies.push(fragment.content.as_str());
        }

        let replacement = reindent(&bodies.join("\n"), &indent);
        template.splice(marker, &replacement)?;
        debug!(marker = %marker, contributors = group.len(), "marker spliced");

        for fragment in &group {
            applied.push(AppliedFragment {
                marker: marker.clone(),
                producer: fragment.producer.clone(),
                order,
                priority: fragment.priority,
                applied_at: Utc::now(),
            });
            order += 1;
        }
    }

    // Whatever remains grouped never matched a template marker.
    for (marker, group) in by_marker {
        for fragment in group {
            issues.push(
                Issue::new(
                    IssueCategory::MissingMarker,
                    &format!("Marker {} not found in template", marker),
                )
                .with_marker(marker)
                .with_producer(&fragment.producer),
            );
        }
    }

    template.bump_version();

    Ok(IntegrationResult {
        version: template.version(),
        applied,
        unresolved_markers: template.markers().to_vec(),
        issues,
        snapshot: template.content().to_string(),
    })
}

/// True if two fragments in the sorted group declare the same priority.
fn has_duplicate_priority(sorted: &[&Fragment]) -> bool {
    sorted.len() > 1 && sorted.windows(2).any(|w| w[0].priority == w[1].priority)
}

/// Prefix every line after the first with `indent`, preserving internal
/// relative indentation. The first line lands at the marker's own column,
/// which already follows the prefix in the template.
fn reindent(body: &str, indent: &str) -> String {
    if indent.is_empty() {
        return body.to_string();
    }
    let mut out = String::with_capacity(body.len());
    for (i, line) in body.lines().enumerate() {
        if i > 0 {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(indent);
            }
        }
        out.push_str(line);
    }
    out
}
