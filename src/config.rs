//! Configuration system for Weaver.
//!
//! Settings load from `weaver.toml`, with sensible defaults for every field
//! so an empty file (or no file at all) yields a working configuration. CLI
//! flags layer on top of the file.
//!
//! # Configuration File Format
//!
//! ```toml
//! [flow]
//! max_remediation_rounds = 3
//! worker_timeout_secs = 120
//! max_parallel_workers = 4
//!
//! [generator]
//! command = "weaver-worker"
//! args = ["--format", "json"]
//!
//! [assets]
//! max_retries_per_level = 3
//! backoff_secs = [1.0, 2.0, 5.0]
//! duration_tolerance = 0.10
//! image_endpoint = "https://api.example.com/images/search"
//! audio_endpoint = "https://freesound.org/apiv2/search/text/"
//!
//! [output]
//! root = "out"
//! document_name = "index.html"
//! ```

use crate::assets::RetryPolicy;
use crate::flow::ExecutorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Flow-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSection {
    /// Remediation rounds before an issue escalates to fatal
    #[serde(default = "default_max_remediation_rounds")]
    pub max_remediation_rounds: u32,
    /// Per-task generation timeout
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    /// Concurrent worker tasks within a phase
    #[serde(default = "default_max_parallel_workers")]
    pub max_parallel_workers: usize,
}

fn default_max_remediation_rounds() -> u32 {
    3
}

fn default_worker_timeout_secs() -> u64 {
    120
}

fn default_max_parallel_workers() -> usize {
    4
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            max_remediation_rounds: default_max_remediation_rounds(),
            worker_timeout_secs: default_worker_timeout_secs(),
            max_parallel_workers: default_max_parallel_workers(),
        }
    }
}

/// The external generator command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_generator_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_generator_command() -> String {
    std::env::var("WEAVER_GENERATOR_CMD").unwrap_or_else(|_| "weaver-worker".to_string())
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            command: default_generator_command(),
            args: Vec::new(),
        }
    }
}

/// Asset acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsSection {
    #[serde(default = "default_max_retries_per_level")]
    pub max_retries_per_level: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: Vec<f64>,
    /// Fractional widening of duration windows (0.10 = ±10%)
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance: f64,
    #[serde(default)]
    pub image_endpoint: String,
    #[serde(default)]
    pub audio_endpoint: String,
    /// API key; the WEAVER_ASSET_API_KEY env var takes precedence
    #[serde(default)]
    pub api_key: String,
}

fn default_max_retries_per_level() -> u32 {
    3
}

fn default_backoff_secs() -> Vec<f64> {
    vec![1.0, 2.0, 5.0]
}

fn default_duration_tolerance() -> f64 {
    0.10
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            max_retries_per_level: default_max_retries_per_level(),
            backoff_secs: default_backoff_secs(),
            duration_tolerance: default_duration_tolerance(),
            image_endpoint: String::new(),
            audio_endpoint: String::new(),
            api_key: String::new(),
        }
    }
}

impl AssetsSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries_per_level,
            self.backoff_secs
                .iter()
                .map(|s| Duration::from_secs_f64(*s))
                .collect(),
        )
    }

    pub fn effective_api_key(&self) -> String {
        std::env::var("WEAVER_ASSET_API_KEY").unwrap_or_else(|_| self.api_key.clone())
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
    #[serde(default = "default_document_name")]
    pub document_name: String,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("out")
}

fn default_document_name() -> String {
    "index.html".to_string()
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            document_name: default_document_name(),
        }
    }
}

/// The unified configuration read from `weaver.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeaverConfig {
    #[serde(default)]
    pub flow: FlowSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub assets: AssetsSection,
    #[serde(default)]
    pub output: OutputSection,
}

impl WeaverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse weaver.toml")
    }

    /// Load from `weaver.toml` in the given directory, or fall back to
    /// defaults when the file does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join("weaver.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize weaver.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Create the output root and its audit subtree.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output.root)
            .with_context(|| format!("Failed to create output root: {}", self.output.root.display()))?;
        std::fs::create_dir_all(self.output.root.join("audit").join("runs"))
            .context("Failed to create audit directories")?;
        Ok(())
    }

    /// Resolve the executor configuration for one run.
    pub fn executor_config(&self, plan_file: &Path, template_file: &Path) -> ExecutorConfig {
        ExecutorConfig {
            output_root: self.output.root.clone(),
            plan_file: plan_file.to_path_buf(),
            template_file: template_file.to_path_buf(),
            document_name: self.output.document_name.clone(),
            max_remediation_rounds: self.flow.max_remediation_rounds,
            worker_timeout: Duration::from_secs(self.flow.worker_timeout_secs),
            max_parallel_workers: self.flow.max_parallel_workers,
            duration_tolerance: self.assets.duration_tolerance,
            asset_retry: self.assets.retry_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: WeaverConfig = toml::from_str("").unwrap();
        assert_eq!(config.flow.max_remediation_rounds, 3);
        assert_eq!(config.flow.worker_timeout_secs, 120);
        assert_eq!(config.flow.max_parallel_workers, 4);
        assert_eq!(config.assets.max_retries_per_level, 3);
        assert!((config.assets.duration_tolerance - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.output.document_name, "index.html");
    }

    #[test]
    fn test_partial_file_overrides_selectively() {
        let config: WeaverConfig = toml::from_str(
            r#"
            [flow]
            max_remediation_rounds = 5

            [output]
            root = "build"
            "#,
        )
        .unwrap();
        assert_eq!(config.flow.max_remediation_rounds, 5);
        assert_eq!(config.flow.worker_timeout_secs, 120);
        assert_eq!(config.output.root, PathBuf::from("build"));
        assert_eq!(config.output.document_name, "index.html");
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let config = WeaverConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.flow.max_remediation_rounds, 3);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weaver.toml");

        let mut config = WeaverConfig::default();
        config.flow.max_parallel_workers = 8;
        config.assets.backoff_secs = vec![0.5, 1.0];
        config.save(&path).unwrap();

        let loaded = WeaverConfig::load(&path).unwrap();
        assert_eq!(loaded.flow.max_parallel_workers, 8);
        assert_eq!(loaded.assets.backoff_secs, vec![0.5, 1.0]);

        let policy = loaded.assets.retry_policy();
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_executor_config_resolution() {
        let mut config = WeaverConfig::default();
        config.flow.worker_timeout_secs = 30;

        let exec = config.executor_config(Path::new("plan.json"), Path::new("index.html"));
        assert_eq!(exec.worker_timeout, Duration::from_secs(30));
        assert_eq!(exec.document_name, "index.html");
        assert_eq!(exec.asset_retry.max_attempts_per_level, 3);
    }
}
