//! Issue classifier and router.
//!
//! Maps each issue category to a remediation action through a static rule
//! table, and folds a round's worth of actions into a single `Routing`
//! verdict: regeneration targets, fatal issues, and recorded warnings.
//! Branching lives here, in one table, instead of being scattered across
//! the flow.

use crate::issue::{Issue, IssueCategory};
use crate::registry::MarkerRegistry;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The remediation action for one issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Regenerate the offending fragment only
    Regenerate,
    /// Substitute a documented placeholder reference, non-fatal
    Placeholder,
    /// Record in the audit log; nothing to remediate
    Record,
    /// Abort the flow
    Fatal,
}

/// A regeneration target: which task to re-run and for which marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenTarget {
    pub marker: String,
    pub producer: Option<String>,
}

/// The router's verdict for one remediation round.
#[derive(Debug, Clone, Default)]
pub struct Routing {
    pub regenerate: Vec<RegenTarget>,
    pub fatal: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl Routing {
    pub fn is_clean(&self) -> bool {
        self.regenerate.is_empty() && self.fatal.is_empty()
    }
}

/// Static category-to-action rule table with bounded retries.
#[derive(Debug, Clone)]
pub struct Router {
    max_remediation_rounds: u32,
}

impl Router {
    pub fn new(max_remediation_rounds: u32) -> Self {
        Self {
            max_remediation_rounds,
        }
    }

    /// Classify one issue. Attempt bounds are checked here: a retryable
    /// issue whose counter is spent becomes fatal.
    pub fn classify(&self, issue: &Issue, registry: &MarkerRegistry) -> Action {
        match issue.category {
            IssueCategory::DuplicateUnordered => Action::Fatal,
            IssueCategory::AssetAcquisition => Action::Placeholder,
            IssueCategory::EmptyFragment => Action::Record,
            IssueCategory::MissingMarker => {
                // A target absent from the registry itself is a config
                // error, not something regeneration can fix.
                match issue.marker.as_deref() {
                    Some(marker) if registry.contains(marker) => {
                        self.bounded_regenerate(issue)
                    }
                    _ => Action::Fatal,
                }
            }
            IssueCategory::Syntax
            | IssueCategory::MissingSymbol
            | IssueCategory::Generation => self.bounded_regenerate(issue),
        }
    }

    fn bounded_regenerate(&self, issue: &Issue) -> Action {
        if issue.exhausted(self.max_remediation_rounds) {
            Action::Fatal
        } else {
            Action::Regenerate
        }
    }

    /// Route a round's issues. Issues scheduled for regeneration consume
    /// one attempt; issues whose action is fatal are escalated in place so
    /// the abort summary carries their full history.
    pub fn route(&self, issues: &mut [Issue], registry: &MarkerRegistry) -> Routing {
        let mut routing = Routing::default();

        for issue in issues.iter_mut() {
            match self.classify(issue, registry) {
                Action::Regenerate => {
                    issue.record_attempt();
                    routing.regenerate.push(RegenTarget {
                        marker: issue.marker.clone().unwrap_or_default(),
                        producer: issue.producer.clone(),
                    });
                }
                Action::Fatal => {
                    warn!(category = %issue.category, attempts = issue.attempts, "issue escalated to fatal");
                    issue.escalate();
                    routing.fatal.push(issue.clone());
                }
                Action::Placeholder | Action::Record => {
                    routing.warnings.push(issue.clone());
                }
            }
        }

        routing.regenerate.dedup();
        routing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentKind;
    use crate::registry::MarkerDecl;

    fn registry_with(markers: &[&str]) -> MarkerRegistry {
        MarkerRegistry::from_decls(
            markers
                .iter()
                .map(|m| MarkerDecl {
                    marker: m.to_string(),
                    owner_phase: "engine".to_string(),
                    kind: FragmentKind::Script,
                    required: true,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_marker_in_registry_regenerates() {
        let router = Router::new(3);
        let registry = registry_with(&["<<A>>"]);
        let issue = Issue::new(IssueCategory::MissingMarker, "gone").with_marker("<<A>>");

        assert_eq!(router.classify(&issue, &registry), Action::Regenerate);
    }

    #[test]
    fn test_missing_marker_not_in_registry_is_fatal() {
        let router = Router::new(3);
        let registry = registry_with(&["<<A>>"]);
        let issue = Issue::new(IssueCategory::MissingMarker, "gone").with_marker("<<Z>>");

        assert_eq!(router.classify(&issue, &registry), Action::Fatal);
    }

    #[test]
    fn test_duplicate_unordered_is_always_fatal() {
        let router = Router::new(3);
        let registry = registry_with(&["<<A>>"]);
        let issue = Issue::new(IssueCategory::DuplicateUnordered, "tie").with_marker("<<A>>");

        assert_eq!(router.classify(&issue, &registry), Action::Fatal);
    }

    #[test]
    fn test_asset_acquisition_degrades_to_placeholder() {
        let router = Router::new(3);
        let registry = registry_with(&[]);
        let issue = Issue::new(IssueCategory::AssetAcquisition, "exhausted");

        assert_eq!(router.classify(&issue, &registry), Action::Placeholder);
    }

    #[test]
    fn test_exhausted_syntax_issue_becomes_fatal() {
        let router = Router::new(3);
        let registry = registry_with(&["<<A>>"]);
        let mut issue = Issue::new(IssueCategory::Syntax, "braces").with_marker("<<A>>");

        assert_eq!(router.classify(&issue, &registry), Action::Regenerate);
        issue.record_attempt();
        issue.record_attempt();
        issue.record_attempt();
        assert_eq!(router.classify(&issue, &registry), Action::Fatal);
    }

    #[test]
    fn test_route_counts_attempts_and_escalates() {
        let router = Router::new(1);
        let registry = registry_with(&["<<A>>"]);
        let mut issues = vec![Issue::new(IssueCategory::Syntax, "braces").with_marker("<<A>>")];

        // Round one: scheduled for regeneration, attempt consumed
        let routing = router.route(&mut issues, &registry);
        assert_eq!(routing.regenerate.len(), 1);
        assert_eq!(issues[0].attempts, 1);

        // Round two: bound of 1 is spent, issue goes fatal
        let routing = router.route(&mut issues, &registry);
        assert!(routing.regenerate.is_empty());
        assert_eq!(routing.fatal.len(), 1);
        assert!(issues[0].severity.is_fatal());
    }

    #[test]
    fn test_route_separates_warnings() {
        let router = Router::new(3);
        let registry = registry_with(&[]);
        let mut issues = vec![
            Issue::new(IssueCategory::EmptyFragment, "empty").with_marker("<<A>>"),
            Issue::new(IssueCategory::AssetAcquisition, "no candidates"),
        ];

        let routing = router.route(&mut issues, &registry);
        assert!(routing.is_clean());
        assert_eq!(routing.warnings.len(), 2);
    }
}
