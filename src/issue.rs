//! Issue types for validation and generation defects.
//!
//! An `Issue` is a detected defect with a category, a severity, the
//! fragment/worker it points at, and its own remediation-attempt counter.
//! Issues are created by the validator, the integrator, or worker failures,
//! and discarded once remediation resolves them or escalates them to fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Defect category; drives routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    /// A fragment targeted a marker absent from the template
    MissingMarker,
    /// Unbalanced delimiters in a script/style fragment
    Syntax,
    /// A promised symbol does not appear in the merged text
    MissingSymbol,
    /// Several fragments share a marker with no total priority order
    DuplicateUnordered,
    /// Asset acquisition exhausted its relaxation ladder
    AssetAcquisition,
    /// Worker task failed or timed out
    Generation,
    /// Worker produced an empty fragment
    EmptyFragment,
}

impl IssueCategory {
    /// The severity an issue of this category starts with.
    pub fn default_severity(&self) -> IssueSeverity {
        match self {
            Self::DuplicateUnordered => IssueSeverity::Fatal,
            Self::EmptyFragment | Self::AssetAcquisition => IssueSeverity::Warning,
            _ => IssueSeverity::Error,
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingMarker => "missing-marker",
            Self::Syntax => "syntax",
            Self::MissingSymbol => "missing-symbol",
            Self::DuplicateUnordered => "duplicate-unordered",
            Self::AssetAcquisition => "asset-acquisition",
            Self::Generation => "generation",
            Self::EmptyFragment => "empty-fragment",
        };
        write!(f, "{}", s)
    }
}

/// Severity of an issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Aborts the flow; not resolvable by regeneration
    Fatal,
    /// Must be remediated before the flow can complete
    #[default]
    Error,
    /// Recorded but never blocks completion
    Warning,
}

impl IssueSeverity {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    /// Check if this severity requires remediation.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Fatal | Self::Error)
    }
}

/// A detected defect with its remediation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub message: String,
    /// Target marker, when the defect points at one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Producing worker task, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    /// Remediation attempts consumed so far
    pub attempts: u32,
    pub detected_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(category: IssueCategory, message: &str) -> Self {
        Self {
            category,
            severity: category.default_severity(),
            message: message.to_string(),
            marker: None,
            producer: None,
            attempts: 0,
            detected_at: Utc::now(),
        }
    }

    pub fn with_marker(mut self, marker: &str) -> Self {
        self.marker = Some(marker.to_string());
        self
    }

    pub fn with_producer(mut self, producer: &str) -> Self {
        self.producer = Some(producer.to_string());
        self
    }

    /// Escalate this issue to fatal, keeping its history.
    pub fn escalate(&mut self) {
        self.severity = IssueSeverity::Fatal;
    }

    /// Consume one remediation attempt.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Check whether the per-issue remediation bound is spent.
    pub fn exhausted(&self, max_rounds: u32) -> bool {
        self.attempts >= max_rounds
    }

    /// Short identifier used in abort summaries.
    pub fn summary(&self) -> String {
        match (&self.marker, &self.producer) {
            (Some(m), _) => format!("{} ({})", self.category, m),
            (None, Some(p)) => format!("{} ({})", self.category, p),
            (None, None) => self.category.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_severity_by_category() {
        assert_eq!(
            IssueCategory::DuplicateUnordered.default_severity(),
            IssueSeverity::Fatal
        );
        assert_eq!(
            IssueCategory::Syntax.default_severity(),
            IssueSeverity::Error
        );
        assert_eq!(
            IssueCategory::EmptyFragment.default_severity(),
            IssueSeverity::Warning
        );
        assert_eq!(
            IssueCategory::AssetAcquisition.default_severity(),
            IssueSeverity::Warning
        );
    }

    #[test]
    fn test_attempt_counting_and_exhaustion() {
        let mut issue = Issue::new(IssueCategory::Syntax, "unbalanced braces");
        assert!(!issue.exhausted(3));

        issue.record_attempt();
        issue.record_attempt();
        issue.record_attempt();
        assert_eq!(issue.attempts, 3);
        assert!(issue.exhausted(3));
    }

    #[test]
    fn test_escalation_is_sticky() {
        let mut issue = Issue::new(IssueCategory::MissingMarker, "no such marker")
            .with_marker("<<C>>");
        assert!(!issue.severity.is_fatal());

        issue.escalate();
        assert!(issue.severity.is_fatal());
        assert_eq!(issue.summary(), "missing-marker (<<C>>)");
    }

    #[test]
    fn test_category_serde_kebab_case() {
        let json = serde_json::to_string(&IssueCategory::MissingMarker).unwrap();
        assert_eq!(json, "\"missing-marker\"");

        let parsed: IssueCategory = serde_json::from_str("\"duplicate-unordered\"").unwrap();
        assert_eq!(parsed, IssueCategory::DuplicateUnordered);
    }

    #[test]
    fn test_warning_not_blocking() {
        assert!(!IssueSeverity::Warning.is_blocking());
        assert!(IssueSeverity::Error.is_blocking());
        assert!(IssueSeverity::Fatal.is_blocking());
    }
}
