//! Asset acquisition subsystem.
//!
//! An `AssetSpec` asks for one external resource (image or audio) with an
//! ordered query and acceptance constraints. The resolver attempts the full
//! query first and relaxes it monotonically on failure; accepted candidates
//! are downloaded into type-partitioned directories under the output root.
//! Asset failures never abort a flow; they degrade to placeholders.

mod policy;
mod resolver;
mod search;
mod store;

pub use policy::RetryPolicy;
pub use resolver::AssetResolver;
pub use search::{AssetSearch, Candidate, HttpAssetSearch};
pub use store::AssetStore;

use serde::{Deserialize, Serialize};

/// Resource type; decides the storage partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Image,
    Audio,
}

impl AssetType {
    /// Storage subdirectory under `<output_root>/assets/`.
    pub fn subdir(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Audio => "audio",
        }
    }
}

/// Request for one external resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Spec id; becomes the stored file's stem
    pub id: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    /// Query terms ordered most-specific first; relaxation drops from
    /// the front
    pub terms: Vec<String>,
    /// Inclusive duration bounds in seconds, widened by the configured
    /// tolerance before filtering
    #[serde(default)]
    pub min_duration_secs: Option<f64>,
    #[serde(default)]
    pub max_duration_secs: Option<f64>,
    /// Acceptable formats (empty = any)
    #[serde(default)]
    pub formats: Vec<String>,
    /// Acceptable license substrings (empty = any)
    #[serde(default)]
    pub licenses: Vec<String>,
}

impl AssetSpec {
    /// The query string at a given relaxation level: the remaining terms
    /// after dropping the `level` most specific ones.
    pub fn query_at(&self, level: usize) -> Option<String> {
        if level >= self.terms.len() {
            return None;
        }
        Some(self.terms[level..].join(" "))
    }

    /// Number of relaxation levels available (one per term).
    pub fn levels(&self) -> usize {
        self.terms.len()
    }
}

/// One recorded acquisition attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub level: u32,
    pub attempt: u32,
    pub query: String,
    /// Candidates surviving the acceptance filters
    pub accepted_candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The accepted candidate, once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAsset {
    pub candidate_id: String,
    pub name: String,
    pub url: String,
    pub license: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Local path once persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<std::path::PathBuf>,
}

/// Outcome of acquiring one asset. Persisted to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetResult {
    pub spec_id: String,
    pub asset_type: AssetType,
    pub success: bool,
    /// Relaxation level that succeeded, or the last level tried
    pub relaxation_level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedAsset>,
    /// True when the reference is the documented placeholder
    pub placeholder: bool,
    /// Full attempted-level trace
    pub trace: Vec<AttemptRecord>,
}

impl AssetResult {
    /// The documented placeholder reference for a failed acquisition.
    pub fn placeholder_reference(spec: &AssetSpec) -> String {
        format!("assets/placeholders/{}.{}", spec.id, match spec.asset_type {
            AssetType::Image => "png",
            AssetType::Audio => "mp3",
        })
    }
}
