//! The shared mutable document.
//!
//! The template is the single shared mutable resource of a flow. Ownership
//! transitions explicitly: unowned during generation, exclusively owned by
//! the integrator during splicing, frozen after final validation. Markers
//! are consumed on splice, so the transform is one-shot.

use crate::errors::IntegrationError;
use serde::{Deserialize, Serialize};

/// The shared document with its remaining markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    content: String,
    /// Markers still present, ordered by position in the content
    markers: Vec<String>,
    /// Markers consumed by previous splices
    consumed: Vec<String>,
    /// Incremented once per integration pass
    version: u64,
    frozen: bool,
}

impl Template {
    /// Create a template from a base artifact, scanning for the given marker
    /// tokens. Only tokens actually present in the content are tracked;
    /// registry validation reports the absent ones.
    pub fn new(content: &str, marker_tokens: &[String]) -> Self {
        let mut found: Vec<(usize, String)> = marker_tokens
            .iter()
            .filter_map(|m| content.find(m.as_str()).map(|pos| (pos, m.clone())))
            .collect();
        found.sort_by_key(|(pos, _)| *pos);

        Self {
            content: content.to_string(),
            markers: found.into_iter().map(|(_, m)| m).collect(),
            consumed: Vec::new(),
            version: 0,
            frozen: false,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Markers not yet consumed, in document order.
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn contains_marker(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| m == marker)
    }

    /// Number of times the marker token occurs in the current content.
    pub fn marker_occurrences(&self, marker: &str) -> usize {
        self.content.matches(marker).count()
    }

    pub fn was_consumed(&self, marker: &str) -> bool {
        self.consumed.iter().any(|m| m == marker)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freeze the template after final validation. Further splices fail.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// The leading-whitespace prefix of the line containing the marker's
    /// first occurrence.
    pub fn marker_indent(&self, marker: &str) -> Option<String> {
        let pos = self.content.find(marker)?;
        let line_start = self.content[..pos].rfind('\n').map_or(0, |i| i + 1);
        let prefix: String = self.content[line_start..pos]
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect();
        Some(prefix)
    }

    /// Replace the first occurrence of `marker` with `replacement` and
    /// consume the marker. Only the integrator calls this.
    pub(crate) fn splice(&mut self, marker: &str, replacement: &str) -> Result<(), IntegrationError> {
        if self.frozen {
            return Err(IntegrationError::Frozen);
        }
        if self.was_consumed(marker) {
            return Err(IntegrationError::AlreadyIntegrated {
                marker: marker.to_string(),
                version: self.version,
            });
        }
        let idx = self
            .markers
            .iter()
            .position(|m| m == marker)
            .ok_or_else(|| IntegrationError::MissingMarker(marker.to_string()))?;

        self.content = self.content.replacen(marker, replacement, 1);
        let consumed = self.markers.remove(idx);
        self.consumed.push(consumed);
        Ok(())
    }

    /// Bump the version counter; one bump per integration pass.
    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_markers_scanned_in_document_order() {
        let tpl = Template::new(
            "head\n<<B>>\nmiddle\n<<A>>\n",
            &markers(&["<<A>>", "<<B>>", "<<C>>"]),
        );
        // <<C>> is not present; <<B>> comes before <<A>> in the document
        assert_eq!(tpl.markers(), &["<<B>>".to_string(), "<<A>>".to_string()]);
    }

    #[test]
    fn test_marker_occurrence_count() {
        let tpl = Template::new("<<A>>\nmid\n<<A>>\n", &markers(&["<<A>>"]));
        assert_eq!(tpl.marker_occurrences("<<A>>"), 2);
        assert_eq!(tpl.marker_occurrences("<<B>>"), 0);
    }

    #[test]
    fn test_splice_consumes_marker_once() {
        let mut tpl = Template::new("a\n<<A>>\nb\n", &markers(&["<<A>>"]));
        tpl.splice("<<A>>", "x = 1;").unwrap();

        assert!(tpl.content().contains("x = 1;"));
        assert!(!tpl.content().contains("<<A>>"));
        assert!(tpl.was_consumed("<<A>>"));

        let err = tpl.splice("<<A>>", "y = 2;").unwrap_err();
        assert!(matches!(
            err,
            IntegrationError::AlreadyIntegrated { .. }
        ));
    }

    #[test]
    fn test_splice_unknown_marker() {
        let mut tpl = Template::new("a\n", &markers(&["<<A>>"]));
        let err = tpl.splice("<<Z>>", "x").unwrap_err();
        assert!(matches!(err, IntegrationError::MissingMarker(_)));
    }

    #[test]
    fn test_frozen_template_rejects_splice() {
        let mut tpl = Template::new("<<A>>\n", &markers(&["<<A>>"]));
        tpl.freeze();
        let err = tpl.splice("<<A>>", "x").unwrap_err();
        assert!(matches!(err, IntegrationError::Frozen));
    }

    #[test]
    fn test_marker_indent_prefix() {
        let tpl = Template::new("fn main() {\n    <<BODY>>\n}\n", &markers(&["<<BODY>>"]));
        assert_eq!(tpl.marker_indent("<<BODY>>").as_deref(), Some("    "));

        let tpl = Template::new("\t\t<<T>>\n", &markers(&["<<T>>"]));
        assert_eq!(tpl.marker_indent("<<T>>").as_deref(), Some("\t\t"));

        let tpl = Template::new("<<Z>>\n", &markers(&["<<Z>>"]));
        assert_eq!(tpl.marker_indent("<<Z>>").as_deref(), Some(""));
    }
}
