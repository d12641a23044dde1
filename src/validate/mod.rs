//! Structural validator over an integration pass.
//!
//! Three checks: marker coverage against the registry, a string-aware
//! balanced-delimiter scan over script/style fragments, and a declared-symbol
//! check against the merged text. This is a structural checker, not a
//! semantic one: it cannot prove the spliced code runs, only that it is not
//! obviously malformed.

use crate::fragment::Fragment;
use crate::issue::{Issue, IssueCategory};
use crate::phase::TaskSpec;
use crate::registry::MarkerRegistry;
use crate::template::Template;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Output of a validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    fn from_issues(issues: Vec<Issue>) -> Self {
        let ok = issues.iter().all(|i| !i.severity.is_blocking());
        Self { ok, issues }
    }
}

/// Structural validator bound to a marker registry.
pub struct Validator<'a> {
    registry: &'a MarkerRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a MarkerRegistry) -> Self {
        Self { registry }
    }

    /// Validate the merged document against the fragment set and task
    /// promises of the current pass. Coverage is scoped to markers owned by
    /// `phase_id`; markers owned by later phases are not due yet.
    pub fn validate(
        &self,
        template: &Template,
        fragments: &[Fragment],
        tasks: &[&TaskSpec],
        phase_id: &str,
    ) -> ValidationReport {
        let mut issues = Vec::new();

        self.check_coverage(template, phase_id, &mut issues);
        self.check_delimiters(fragments, &mut issues);
        self.check_symbols(template, tasks, &mut issues);

        debug!(issues = issues.len(), "validation pass complete");
        ValidationReport::from_issues(issues)
    }

    /// Every required marker owned by the given phase must have been
    /// consumed.
    fn check_coverage(&self, template: &Template, phase_id: &str, issues: &mut Vec<Issue>) {
        for decl in self.registry.required_markers() {
            if decl.owner_phase != phase_id {
                continue;
            }
            if !template.was_consumed(&decl.marker) {
                issues.push(
                    Issue::new(
                        IssueCategory::MissingMarker,
                        &format!("Required marker {} was not consumed", decl.marker),
                    )
                    .with_marker(&decl.marker),
                );
            }
        }
    }

    /// Brace/paren/bracket balance over script and style fragments.
    fn check_delimiters(&self, fragments: &[Fragment], issues: &mut Vec<Issue>) {
        for fragment in fragments {
            if !fragment.kind.is_code() {
                continue;
            }
            if let Err(detail) = scan_balance(&fragment.content) {
                issues.push(
                    Issue::new(
                        IssueCategory::Syntax,
                        &format!(
                            "Unbalanced delimiters in fragment from {}: {}",
                            fragment.producer, detail
                        ),
                    )
                    .with_marker(&fragment.marker)
                    .with_producer(&fragment.producer),
                );
            }
        }
    }

    /// Every symbol a task promised must appear in the merged text.
    fn check_symbols(&self, template: &Template, tasks: &[&TaskSpec], issues: &mut Vec<Issue>) {
        for task in tasks {
            for symbol in &task.payload.declared_symbols {
                if !template.content().contains(symbol.as_str()) {
                    issues.push(
                        Issue::new(
                            IssueCategory::MissingSymbol,
                            &format!(
                                "Symbol {} promised by {} is absent from the merged document",
                                symbol, task.id
                            ),
                        )
                        .with_marker(&task.marker)
                        .with_producer(&task.id),
                    );
                }
            }
        }
    }
}

/// Depth-count `(){}[]` while skipping string literals and comments, so
/// delimiters inside quoted text never skew the counts.
fn scan_balance(text: &str) -> Result<(), String> {
    let mut stack: Vec<char> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut in_string: Option<char> = None;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
            }
            continue;
        }
        if in_block_comment {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
            }
            continue;
        }
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' | '`' => in_string = Some(ch),
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                in_line_comment = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block_comment = true;
            }
            '(' | '{' | '[' => stack.push(ch),
            ')' | '}' | ']' => {
                let expected = match ch {
                    ')' => '(',
                    '}' => '{',
                    _ => '[',
                };
                match stack.pop() {
                    Some(open) if open == expected => {}
                    Some(open) => {
                        return Err(format!("'{}' closed by '{}'", open, ch));
                    }
                    None => return Err(format!("unmatched '{}'", ch)),
                }
            }
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(format!("unclosed '{}'", open));
    }
    Ok(())
}
