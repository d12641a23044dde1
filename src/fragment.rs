//! Fragment types.
//!
//! A `Fragment` is the text one worker produced for one marker. Fragments
//! are consumed exactly once by the integrator.

use serde::{Deserialize, Serialize};

/// The kind of content a fragment carries.
///
/// The kind determines which validator checks apply: script and style
/// fragments get the balanced-delimiter scan, markup does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    #[default]
    Markup,
    Style,
    Script,
}

impl FragmentKind {
    /// Check whether this kind is subject to the delimiter-balance scan.
    pub fn is_code(&self) -> bool {
        matches!(self, Self::Script | Self::Style)
    }
}

/// Generated text targeted at one marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Id of the worker task that produced this fragment
    pub producer: String,
    /// Target marker token (exact match)
    pub marker: String,
    /// The generated text
    pub content: String,
    /// Content kind
    pub kind: FragmentKind,
    /// Declared application priority; lower applies first when several
    /// fragments share a marker
    pub priority: u32,
}

impl Fragment {
    pub fn new(producer: &str, marker: &str, content: &str, kind: FragmentKind) -> Self {
        Self {
            producer: producer.to_string(),
            marker: marker.to_string(),
            content: content.to_string(),
            kind,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// A fragment is empty if it contains no non-whitespace content.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}
